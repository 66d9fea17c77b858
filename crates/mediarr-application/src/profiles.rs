// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mediarr_config::AppConfig;
use mediarr_domain::{
    ConfigurationError, DelayProfile, DownloadProtocol, Profile, ProfileId, ProfileQualityItem,
    Quality, Tag, Validate,
};
use tracing::info;

/// Resolves quality and delay profiles.
pub trait ProfileStore: Send + Sync {
    fn profile(&self, id: ProfileId) -> Result<Arc<Profile>, ConfigurationError>;

    /// Profile used where no media is known (queue sorting, unknown items).
    fn default_profile(&self) -> Arc<Profile>;

    /// Most specific tagged profile sharing a tag with `tags`, else the untagged one.
    fn delay_profile_for_tags(&self, tags: &BTreeSet<Tag>) -> DelayProfile;
}

pub struct InMemoryProfileStore {
    profiles: BTreeMap<ProfileId, Arc<Profile>>,
    default_profile: Arc<Profile>,
    delay_profiles: Vec<DelayProfile>,
    global_delay_profile: DelayProfile,
}

impl InMemoryProfileStore {
    pub fn new(
        profiles: Vec<Profile>,
        delay_profiles: Vec<DelayProfile>,
    ) -> Result<Self, ConfigurationError> {
        let mut by_id = BTreeMap::new();
        for profile in profiles {
            by_id.insert(profile.id, Arc::new(profile));
        }
        let default_profile = by_id
            .values()
            .next()
            .cloned()
            .ok_or_else(|| ConfigurationError::Invalid {
                entity: "profile store",
                name: "profiles".to_string(),
                message: "at least one quality profile is required".to_string(),
            })?;

        for delay_profile in &delay_profiles {
            delay_profile
                .validate()
                .map_err(|errors| ConfigurationError::Invalid {
                    entity: "delay profile",
                    name: delay_profile.id.to_string(),
                    message: errors
                        .into_iter()
                        .map(|e| format!("{}: {}", e.field, e.message))
                        .collect::<Vec<_>>()
                        .join("; "),
                })?;
        }

        let global_delay_profile = delay_profiles
            .iter()
            .find(|p| p.is_global())
            .cloned()
            .ok_or(ConfigurationError::MissingGlobalDelayProfile)?;

        let mut tagged: Vec<DelayProfile> =
            delay_profiles.into_iter().filter(|p| !p.is_global()).collect();
        tagged.sort_by_key(|p| p.order);

        Ok(Self {
            profiles: by_id,
            default_profile,
            delay_profiles: tagged,
            global_delay_profile,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigurationError> {
        let mut profiles = Vec::with_capacity(config.profiles.len());
        for section in &config.profiles {
            let items = section
                .qualities
                .iter()
                .map(|name| resolve_quality(name).map(ProfileQualityItem::allowed))
                .collect::<Result<Vec<_>, _>>()?;
            let cutoff = resolve_quality(&section.cutoff)?;
            let profile = Profile::new(ProfileId(section.id), section.name.clone(), items, cutoff)?
                .with_upgrades(section.upgrade_allowed);
            profiles.push(profile);
        }

        let mut delay_profiles = Vec::with_capacity(config.delay_profiles.len());
        for section in &config.delay_profiles {
            let preferred_protocol = match section.preferred_protocol.to_lowercase().as_str() {
                "usenet" => DownloadProtocol::Usenet,
                "torrent" => DownloadProtocol::Torrent,
                other => {
                    return Err(ConfigurationError::Invalid {
                        entity: "delay profile",
                        name: section.id.to_string(),
                        message: format!("unknown protocol '{other}'"),
                    })
                }
            };
            delay_profiles.push(DelayProfile {
                id: section.id,
                order: section.order,
                preferred_protocol,
                usenet_delay_minutes: section.usenet_delay_minutes,
                torrent_delay_minutes: section.torrent_delay_minutes,
                tags: section.tags.iter().copied().collect(),
            });
        }

        let store = Self::new(profiles, delay_profiles)?;
        info!(
            target: "profiles",
            profiles = store.profiles.len(),
            delay_profiles = store.delay_profiles.len() + 1,
            "profiles resolved"
        );
        Ok(store)
    }
}

fn resolve_quality(name: &str) -> Result<Quality, ConfigurationError> {
    Quality::find_by_name(name).ok_or_else(|| ConfigurationError::UnknownQuality(name.to_string()))
}

impl ProfileStore for InMemoryProfileStore {
    fn profile(&self, id: ProfileId) -> Result<Arc<Profile>, ConfigurationError> {
        self.profiles
            .get(&id)
            .cloned()
            .ok_or(ConfigurationError::UnknownProfile(id))
    }

    fn default_profile(&self) -> Arc<Profile> {
        self.default_profile.clone()
    }

    fn delay_profile_for_tags(&self, tags: &BTreeSet<Tag>) -> DelayProfile {
        let mut best: Option<(usize, &DelayProfile)> = None;
        for profile in &self.delay_profiles {
            let overlap = profile.tags.intersection(tags).count();
            if overlap == 0 {
                continue;
            }
            // Profiles are pre-sorted by order, so strict > keeps the lowest order on ties.
            if best.map_or(true, |(count, _)| overlap > count) {
                best = Some((overlap, profile));
            }
        }
        best.map(|(_, profile)| profile.clone())
            .unwrap_or_else(|| self.global_delay_profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile::new(
            ProfileId(1),
            "Any",
            vec![ProfileQualityItem::allowed(Quality::SDTV)],
            Quality::SDTV,
        )
        .unwrap()
    }

    fn tagged(id: u32, order: u32, delay: u32, tags: &[Tag]) -> DelayProfile {
        DelayProfile {
            id,
            order,
            preferred_protocol: DownloadProtocol::Usenet,
            usenet_delay_minutes: delay,
            torrent_delay_minutes: delay,
            tags: tags.iter().copied().collect(),
        }
    }

    #[test]
    fn missing_global_delay_profile_is_a_configuration_error() {
        let result = InMemoryProfileStore::new(vec![profile()], vec![tagged(2, 1, 60, &[1])]);
        assert!(matches!(result, Err(ConfigurationError::MissingGlobalDelayProfile)));
    }

    #[test]
    fn most_specific_tag_match_wins() {
        let store = InMemoryProfileStore::new(
            vec![profile()],
            vec![
                DelayProfile::global(0, 0),
                tagged(2, 1, 60, &[1]),
                tagged(3, 2, 120, &[1, 2]),
            ],
        )
        .unwrap();

        let tags: BTreeSet<Tag> = [1, 2].into_iter().collect();
        assert_eq!(store.delay_profile_for_tags(&tags).id, 3);

        let one: BTreeSet<Tag> = [1].into_iter().collect();
        assert_eq!(store.delay_profile_for_tags(&one).id, 2);

        let none = BTreeSet::new();
        assert!(store.delay_profile_for_tags(&none).is_global());
    }

    #[test]
    fn lower_order_breaks_ties() {
        let store = InMemoryProfileStore::new(
            vec![profile()],
            vec![
                DelayProfile::global(0, 0),
                tagged(7, 5, 60, &[4]),
                tagged(8, 2, 30, &[4]),
            ],
        )
        .unwrap();
        let tags: BTreeSet<Tag> = [4].into_iter().collect();
        assert_eq!(store.delay_profile_for_tags(&tags).id, 8);
    }

    #[test]
    fn default_config_resolves() {
        let store = InMemoryProfileStore::from_config(&AppConfig::default()).unwrap();
        let profile = store.profile(ProfileId(1)).unwrap();
        assert_eq!(profile.cutoff, Quality::BLURAY_1080P);
        assert!(store.profile(ProfileId(99)).is_err());
    }

    #[test]
    fn unknown_quality_name_is_rejected() {
        let mut config = AppConfig::default();
        config.profiles[0].qualities.push("VHS".to_string());
        assert!(matches!(
            InMemoryProfileStore::from_config(&config),
            Err(ConfigurationError::UnknownQuality(name)) if name == "VHS"
        ));
    }
}
