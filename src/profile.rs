//! Profile-based activation of components.
//!
//! The set of active profiles is computed once, from the first source providing a non-empty list:
//!
//! 1. the `SPROUT_PROFILES_ACTIVE` environment variable (explicit override),
//! 2. the `sprout.profiles.active` configuration key,
//! 3. the generic `APP_ENV` environment variable,
//! 4. the `development` default.
//!
//! A [ProfileExpr] is evaluated against this set when a component is registered.

use std::fmt;

use crate::value::ValueSource;

pub const DEFAULT_PROFILE: &str = "development";
pub const PROFILES_OVERRIDE_ENV: &str = "SPROUT_PROFILES_ACTIVE";
pub const PROFILES_CONFIG_KEY: &str = "sprout.profiles.active";
pub const PROFILE_FALLBACK_ENV: &str = "APP_ENV";

/// Ordered set of active profile names
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveProfiles(Vec<String>);

impl ActiveProfiles {
    /// Parse a comma separated list, trimming entries and dropping empty ones
    pub fn parse(list: &str) -> Self {
        let mut profiles: Vec<String> = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !profiles.iter().any(|p| p == entry) {
                profiles.push(entry.to_string());
            }
        }
        Self(profiles)
    }

    /// Pick the first source with at least one profile, by decreasing priority
    pub fn resolve(overridden: Option<&str>, config: Option<&str>, fallback: Option<&str>) -> Self {
        [overridden, config, fallback]
            .into_iter()
            .flatten()
            .map(Self::parse)
            .find(|profiles| !profiles.is_empty())
            .unwrap_or_else(|| Self(vec![DEFAULT_PROFILE.to_string()]))
    }

    /// Active profiles from the environment only
    pub fn from_env() -> Self {
        let overridden = std::env::var(PROFILES_OVERRIDE_ENV).ok();
        let fallback = std::env::var(PROFILE_FALLBACK_ENV).ok();
        Self::resolve(overridden.as_deref(), None, fallback.as_deref())
    }

    /// Active profiles from the environment and a configuration source
    pub fn from_sources(config: &dyn ValueSource) -> Self {
        let overridden = std::env::var(PROFILES_OVERRIDE_ENV).ok();
        let configured = config.get(PROFILES_CONFIG_KEY);
        let fallback = std::env::var(PROFILE_FALLBACK_ENV).ok();
        Self::resolve(
            overridden.as_deref(),
            configured.as_deref(),
            fallback.as_deref(),
        )
    }

    pub fn is_active(&self, profile: &str) -> bool {
        self.0.iter().any(|p| p == profile)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ActiveProfiles {
    fn default() -> Self {
        Self(vec![DEFAULT_PROFILE.to_string()])
    }
}

impl fmt::Display for ActiveProfiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ProfileMatcher {
    Active(String),
    NotActive(String),
}

impl ProfileMatcher {
    /// `None` for entries without a profile name, such as `""` or `"!"`
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (negated, name) = match entry.strip_prefix('!') {
            Some(name) => (true, name.trim()),
            None => (false, entry),
        };
        if name.is_empty() {
            return None;
        }
        Some(if negated {
            ProfileMatcher::NotActive(name.to_string())
        } else {
            ProfileMatcher::Active(name.to_string())
        })
    }

    fn matches(&self, profiles: &ActiveProfiles) -> bool {
        match self {
            ProfileMatcher::Active(name) => profiles.is_active(name),
            ProfileMatcher::NotActive(name) => !profiles.is_active(name),
        }
    }
}

/// Profile condition attached to a component: matches if any entry matches
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileExpr(Vec<ProfileMatcher>);

impl ProfileExpr {
    /// Single entry, optionally negated with a leading `!`
    pub fn parse(entry: &str) -> Self {
        Self(ProfileMatcher::parse(entry).into_iter().collect())
    }

    pub fn any_of<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            entries
                .into_iter()
                .filter_map(|e| ProfileMatcher::parse(e.as_ref()))
                .collect(),
        )
    }

    /// An expression without entries places no constraint
    pub fn matches(&self, profiles: &ActiveProfiles) -> bool {
        self.0.is_empty() || self.0.iter().any(|m| m.matches(profiles))
    }
}
