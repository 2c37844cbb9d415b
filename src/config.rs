use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::similarity::Scorer;

pub const DEFAULT_PLAYER_THRESHOLD: u8 = 88;
pub const DEFAULT_TEAM_THRESHOLD: u8 = 80;
pub const DEFAULT_GLOBAL_THRESHOLD: u8 = 92;
pub const DEFAULT_UNMATCHED_LOG: &str = "data/interim/unmatched_match_players.csv";

/// Club labels seen on match pages, mapped to league abbreviations.
pub const DEFAULT_TEAM_ALIASES: &[(&str, &str)] = &[
    ("Atlanta United", "ATL"),
    ("Austin FC", "ATX"),
    ("CF Montréal", "MTL"),
    ("Charlotte FC", "CLT"),
    ("Chicago Fire FC", "CHI"),
    ("Chicago Fire", "CHI"),
    ("FC Cincinnati", "CIN"),
    ("Colorado Rapids", "COL"),
    ("Columbus Crew", "CLB"),
    ("D.C. United", "DC"),
    ("FC Dallas", "DAL"),
    ("Houston Dynamo FC", "HOU"),
    ("Houston Dynamo", "HOU"),
    ("Sporting Kansas City", "SKC"),
    ("Kansas City", "SKC"),
    ("LA Galaxy", "LA"),
    ("Los Angeles Football Club", "LAFC"),
    ("Los Angeles FC", "LAFC"),
    ("Inter Miami CF", "MIA"),
    ("Inter Miami", "MIA"),
    ("Minnesota United", "MIN"),
    ("Minnesota United FC", "MIN"),
    ("Nashville SC", "NSH"),
    ("New England Revolution", "NE"),
    ("New England", "NE"),
    ("New York City Football Club", "NYC"),
    ("New York City FC", "NYC"),
    ("New York City", "NYC"),
    ("New York Red Bulls", "RBNY"),
    ("Orlando City", "ORL"),
    ("Orlando City SC", "ORL"),
    ("Philadelphia Union", "PHI"),
    ("Portland Timbers", "POR"),
    ("Real Salt Lake", "RSL"),
    ("Salt Lake", "RSL"),
    ("San Diego FC", "SD"),
    ("San Jose Earthquakes", "SJ"),
    ("Seattle Sounders FC", "SEA"),
    ("St. Louis CITY SC", "STL"),
    ("Toronto FC", "TOR"),
    ("Vancouver Whitecaps FC", "VAN"),
];

/// Which roster stints make a player eligible for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityMode {
    /// Stints covering the match date; whole team history when the date is
    /// unknown.
    #[default]
    DateScoped,
    /// Every player who was ever on the team, regardless of date.
    WholeHistory,
}

impl EligibilityMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "date" | "date_scoped" | "date-scoped" => Some(EligibilityMode::DateScoped),
            "history" | "whole_history" | "whole-history" => Some(EligibilityMode::WholeHistory),
            _ => None,
        }
    }
}

/// Input column names. Overridable because upstream cleaning has renamed
/// these more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub match_id: String,
    pub club: String,
    pub name: String,
    pub team_id: String,
    pub match_date: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            match_id: "match_id".to_string(),
            club: "club".to_string(),
            name: "player_name".to_string(),
            team_id: "team_id".to_string(),
            match_date: "match_date".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub player_threshold: u8,
    pub team_threshold: u8,
    pub global_fallback: bool,
    pub global_threshold: u8,
    pub eligibility: EligibilityMode,
    pub scorer: Scorer,
    pub parallel: bool,
    pub log_path: PathBuf,
    pub columns: ColumnNames,
    /// Club label -> abbreviation. Labels are matched after
    /// `normalize::club_label_key`.
    pub team_aliases: BTreeMap<String, String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            player_threshold: DEFAULT_PLAYER_THRESHOLD,
            team_threshold: DEFAULT_TEAM_THRESHOLD,
            global_fallback: false,
            global_threshold: DEFAULT_GLOBAL_THRESHOLD,
            eligibility: EligibilityMode::default(),
            scorer: Scorer::default(),
            parallel: false,
            log_path: PathBuf::from(DEFAULT_UNMATCHED_LOG),
            columns: ColumnNames::default(),
            team_aliases: default_team_aliases(),
        }
    }
}

impl ResolverConfig {
    /// Defaults overlaid with `MLS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `MLS_*` key.
    /// Blank values are ignored; a value that does not parse is an error
    /// naming the key.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cfg = Self::default();
        if let Some(raw) = var("MLS_PLAYER_THRESHOLD") {
            cfg.player_threshold = parse_threshold("MLS_PLAYER_THRESHOLD", &raw)?;
        }
        if let Some(raw) = var("MLS_TEAM_THRESHOLD") {
            cfg.team_threshold = parse_threshold("MLS_TEAM_THRESHOLD", &raw)?;
        }
        if let Some(raw) = var("MLS_GLOBAL_THRESHOLD") {
            cfg.global_threshold = parse_threshold("MLS_GLOBAL_THRESHOLD", &raw)?;
        }
        if let Some(raw) = var("MLS_GLOBAL_FALLBACK") {
            cfg.global_fallback = parse_flag("MLS_GLOBAL_FALLBACK", &raw)?;
        }
        if let Some(raw) = var("MLS_PARALLEL") {
            cfg.parallel = parse_flag("MLS_PARALLEL", &raw)?;
        }
        if let Some(raw) = var("MLS_ELIGIBILITY") {
            cfg.eligibility =
                EligibilityMode::parse(&raw).ok_or_else(|| invalid("MLS_ELIGIBILITY", &raw))?;
        }
        if let Some(raw) = var("MLS_SCORER") {
            cfg.scorer = Scorer::parse(&raw).ok_or_else(|| invalid("MLS_SCORER", &raw))?;
        }
        if let Some(path) = var("MLS_UNMATCHED_LOG") {
            cfg.log_path = PathBuf::from(path);
        }
        if let Some(col) = var("MLS_MATCH_ID_COL") {
            cfg.columns.match_id = col;
        }
        if let Some(col) = var("MLS_CLUB_COL") {
            cfg.columns.club = col;
        }
        if let Some(col) = var("MLS_NAME_COL") {
            cfg.columns.name = col;
        }
        if let Some(col) = var("MLS_TEAM_ID_COL") {
            cfg.columns.team_id = col;
        }
        if let Some(col) = var("MLS_MATCH_DATE_COL") {
            cfg.columns.match_date = col;
        }
        if let Some(path) = var("MLS_TEAM_ALIASES") {
            let extra = load_alias_file(Path::new(&path))?;
            cfg.team_aliases.extend(extra);
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("player_threshold", self.player_threshold),
            ("team_threshold", self.team_threshold),
            ("global_threshold", self.global_threshold),
        ] {
            check_threshold(name, u32::from(value))?;
        }
        Ok(())
    }
}

pub fn default_team_aliases() -> BTreeMap<String, String> {
    DEFAULT_TEAM_ALIASES
        .iter()
        .map(|(label, abbr)| (label.to_string(), abbr.to_string()))
        .collect()
}

/// Reads a JSON object of `{"club label": "ABBR"}` pairs.
pub fn load_alias_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read team alias file {}", path.display()))?;
    serde_json::from_str::<BTreeMap<String, String>>(&raw)
        .with_context(|| format!("parse team alias file {}", path.display()))
}

fn check_threshold(name: &'static str, value: u32) -> Result<u8, PipelineError> {
    if value > 100 {
        return Err(PipelineError::InvalidThreshold { name, value });
    }
    Ok(value as u8)
}

fn parse_threshold(key: &'static str, raw: &str) -> Result<u8, PipelineError> {
    let value = raw.parse::<u32>().map_err(|_| invalid(key, raw))?;
    check_threshold(key, value)
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, PipelineError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw)),
    }
}

fn invalid(key: &'static str, raw: &str) -> PipelineError {
    PipelineError::InvalidSetting {
        key,
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ResolverConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.player_threshold, 88);
        assert_eq!(cfg.columns.name, "player_name");
        assert_eq!(cfg.team_aliases.get("Minnesota United FC").map(String::as_str), Some("MIN"));
    }

    #[test]
    fn threshold_over_100_rejected() {
        let cfg = ResolverConfig {
            team_threshold: 101,
            ..ResolverConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PipelineError::InvalidThreshold { name: "team_threshold", value: 101 })
        ));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(EligibilityMode::parse("history"), Some(EligibilityMode::WholeHistory));
        assert_eq!(EligibilityMode::parse("Date-Scoped"), Some(EligibilityMode::DateScoped));
        assert_eq!(EligibilityMode::parse("club"), None);
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<std::collections::HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ResolverConfig::from_vars(vars(&[
            ("MLS_PLAYER_THRESHOLD", " 90 "),
            ("MLS_GLOBAL_FALLBACK", "yes"),
            ("MLS_ELIGIBILITY", "whole_history"),
            ("MLS_SCORER", "jaro-winkler"),
            ("MLS_NAME_COL", "Player"),
            ("MLS_TEAM_THRESHOLD", ""),
        ]))
        .unwrap();
        assert_eq!(cfg.player_threshold, 90);
        assert_eq!(cfg.team_threshold, DEFAULT_TEAM_THRESHOLD);
        assert!(cfg.global_fallback);
        assert_eq!(cfg.eligibility, EligibilityMode::WholeHistory);
        assert_eq!(cfg.scorer, Scorer::JaroWinkler);
        assert_eq!(cfg.columns.name, "Player");
    }

    #[test]
    fn unparseable_env_values_are_errors() {
        for (key, raw) in [
            ("MLS_PLAYER_THRESHOLD", "eighty"),
            ("MLS_TEAM_THRESHOLD", "-5"),
            ("MLS_ELIGIBILITY", "club"),
            ("MLS_SCORER", "soundex"),
            ("MLS_PARALLEL", "maybe"),
        ] {
            let err = ResolverConfig::from_vars(vars(&[(key, raw)])).unwrap_err();
            match err.downcast_ref::<PipelineError>() {
                Some(PipelineError::InvalidSetting { key: k, value }) => {
                    assert_eq!(*k, key);
                    assert_eq!(value.as_str(), raw);
                }
                other => panic!("{key}={raw}: unexpected error {other:?}"),
            }
            assert!(err.to_string().contains(key));
        }

        let err = ResolverConfig::from_vars(vars(&[("MLS_GLOBAL_THRESHOLD", "150")])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidThreshold { value: 150, .. })
        ));
    }

    #[test]
    fn alias_file_overrides_builtin_table() {
        let dir = std::env::temp_dir().join(format!("mls_aliases_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("aliases.json");
        fs::write(&path, r#"{"Minnesota United": "STP", "Loons": "MIN"}"#).unwrap();

        let path_str = path.to_string_lossy().to_string();
        let cfg = ResolverConfig::from_vars(vars(&[("MLS_TEAM_ALIASES", path_str.as_str())])).unwrap();
        assert_eq!(cfg.team_aliases.get("Minnesota United").map(String::as_str), Some("STP"));
        assert_eq!(cfg.team_aliases.get("Loons").map(String::as_str), Some("MIN"));
        assert_eq!(cfg.team_aliases.get("Atlanta United").map(String::as_str), Some("ATL"));

        fs::write(&path, "not json").unwrap();
        assert!(ResolverConfig::from_vars(vars(&[("MLS_TEAM_ALIASES", path_str.as_str())])).is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
