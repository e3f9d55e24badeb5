//! Configuration loading using Figment.
//!
//! Two documents drive a run:
//! 1. the pipeline configuration (`ghrss_config.yaml`): cores, nodes, the
//!    dates to analyse per backend and the storage/pipeline paths;
//! 2. the search manager configuration (`manager_config.yaml`) plus the search
//!    configuration files it lists.
//!
//! Both are YAML files merged with environment overrides. Pipeline keys use the
//! `GHRSS_FFA_` prefix and manager keys the `GHRSS_FFA_MANAGER_` prefix; nested
//! keys are separated by `__`. The pipeline never reads `GHRSS_FFA_MANAGER_*`
//! variables, apart from `GHRSS_FFA_MANAGER_CONFIG` which sets its
//! `manager_config` path (and is in turn hidden from the manager).
//!
//! # Example
//! ```no_run
//! use ghrss_ffa::config::{Backend, PipelineConfig};
//!
//! let config = PipelineConfig::load_from("configurations/ghrss_config.yaml")?;
//! config.validate(Backend::Gwb)?;
//! for date in config.analysis_dates(Backend::Gwb)? {
//!     println!("{}", config.state_path().join(date).display());
//! }
//! # Ok::<(), ghrss_ffa::error::AppError>(())
//! ```
//!
//! Example override: `GHRSS_FFA_PIPELINE_VARIABLES__CORES=16`.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use ffa_search::{ManagerConfig, SearchConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

pub const ENV_PREFIX: &str = "GHRSS_FFA_";
pub const MANAGER_ENV_PREFIX: &str = "GHRSS_FFA_MANAGER_";

/// Whether a `GHRSS_FFA_` variable, prefix stripped, is a pipeline key.
pub fn is_pipeline_env_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "manager_config" || !key.starts_with("manager_")
}

fn pipeline_env() -> Env {
    Env::prefixed(ENV_PREFIX)
        .filter(|key| is_pipeline_env_key(key.as_str()))
        .split("__")
}

fn manager_env() -> Env {
    Env::prefixed(MANAGER_ENV_PREFIX).ignore(&["config"]).split("__")
}
pub const DEFAULT_CONFIG_PATH: &str = "configurations/ghrss_config.yaml";

/// At most this many dates are analysed per invocation.
pub const MAX_ANALYSIS_DATES: usize = 5;

/// Receiver backend the observations were recorded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Backend {
    #[serde(rename = "GSB", alias = "gsb")]
    Gsb,
    #[serde(rename = "GWB", alias = "gwb")]
    Gwb,
    #[serde(rename = "SIM", alias = "sim")]
    Sim,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Gsb => "GSB",
            Backend::Gwb => "GWB",
            Backend::Sim => "SIM",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GSB" => Ok(Backend::Gsb),
            "GWB" => Ok(Backend::Gwb),
            "SIM" => Ok(Backend::Sim),
            _ => Err(format!(
                "Invalid backend '{s}'. Must be one of: GSB, GWB, SIM"
            )),
        }
    }
}

/// Whether the survey runs on one node or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineConfig {
    Single,
    Multiple,
}

impl fmt::Display for MachineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineConfig::Single => f.write_str("single"),
            MachineConfig::Multiple => f.write_str("multiple"),
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_variables: PipelineVariables,
    pub path_variables: PathVariables,
    /// Search manager configuration file. Defaults to
    /// `<pipeline_path>/configurations/ffa_config/manager_config.yaml`.
    #[serde(default)]
    pub manager_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineVariables {
    /// Cores available per node
    #[serde(default = "default_cores")]
    pub cores: usize,
    /// Comma-separated node names
    pub nodes: String,
    /// Comma-separated observing dates, per backend
    #[serde(default)]
    pub dates: BTreeMap<Backend, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathVariables {
    /// Raw and filterbank data, one directory per date
    pub store_path: PathBuf,
    pub pipeline_path: PathBuf,
}

fn default_cores() -> usize {
    1
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new("")).join(name)
}

impl PipelineConfig {
    /// Load configuration from a YAML file and `GHRSS_FFA_` environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::Configuration(format!(
                "pipeline configuration file '{}' does not exist",
                path.display()
            )));
        }
        let config = Figment::new()
            .merge(Yaml::file(path))
            .merge(pipeline_env())
            .extract()?;
        Ok(config)
    }

    /// Validate the configuration for a run on `backend`.
    pub fn validate(&self, backend: Backend) -> AppResult<()> {
        if self.pipeline_variables.cores == 0 {
            return Err(AppError::Configuration(
                "pipeline_variables.cores must be at least 1".into(),
            ));
        }
        if self.nodes().is_empty() {
            return Err(AppError::Configuration(
                "pipeline_variables.nodes must name at least one node".into(),
            ));
        }
        if self.path_variables.store_path.as_os_str().is_empty() {
            return Err(AppError::Configuration(
                "path_variables.store_path must not be empty".into(),
            ));
        }
        self.analysis_dates(backend)?;
        Ok(())
    }

    pub fn cores(&self) -> usize {
        self.pipeline_variables.cores
    }

    pub fn nodes(&self) -> Vec<String> {
        split_list(&self.pipeline_variables.nodes)
    }

    pub fn mach_config(&self) -> MachineConfig {
        if self.nodes().len() > 1 {
            MachineConfig::Multiple
        } else {
            MachineConfig::Single
        }
    }

    /// Dates to analyse for `backend`, truncated to [`MAX_ANALYSIS_DATES`].
    pub fn analysis_dates(&self, backend: Backend) -> AppResult<Vec<String>> {
        let listed = self
            .pipeline_variables
            .dates
            .get(&backend)
            .map(|s| split_list(s))
            .unwrap_or_default();
        if listed.is_empty() {
            return Err(AppError::Configuration(format!(
                "pipeline_variables.dates.{backend} lists no dates"
            )));
        }
        if listed.len() > MAX_ANALYSIS_DATES {
            tracing::warn!(
                listed = listed.len(),
                kept = MAX_ANALYSIS_DATES,
                "Too many dates listed, analysing only the first ones"
            );
        }
        Ok(listed.into_iter().take(MAX_ANALYSIS_DATES).collect())
    }

    pub fn store_path(&self) -> &Path {
        &self.path_variables.store_path
    }

    pub fn rfi_path(&self) -> PathBuf {
        sibling(&self.path_variables.store_path, "RFI")
    }

    pub fn state_path(&self) -> PathBuf {
        sibling(&self.path_variables.store_path, "state")
    }

    pub fn configurations_path(&self) -> PathBuf {
        self.path_variables.pipeline_path.join("configurations")
    }

    pub fn manager_config_path(&self) -> PathBuf {
        self.manager_config.clone().unwrap_or_else(|| {
            self.configurations_path()
                .join("ffa_config")
                .join("manager_config.yaml")
        })
    }

    /// JSON snapshot written as the first ledger record of every date.
    pub fn snapshot(&self, backend: Backend) -> Value {
        json!({
            "backend": backend.as_str(),
            "nodes": self.nodes(),
            "mach_config": self.mach_config().to_string(),
            "cores": self.cores(),
            "dates": self.pipeline_variables.dates.get(&backend),
            "store_path": self.path_variables.store_path,
            "pipeline_path": self.path_variables.pipeline_path,
            "manager_config": self.manager_config_path(),
        })
    }
}

/// A manager configuration with its search configurations resolved.
#[derive(Debug, Clone)]
pub struct SearchSetup {
    pub manager: ManagerConfig,
    pub searches: Vec<SearchConfig>,
}

/// Command-line values that take precedence over the manager file.
#[derive(Debug, Clone, Default)]
pub struct ManagerOverrides {
    pub glob: Option<String>,
    pub outdir: Option<PathBuf>,
}

impl SearchSetup {
    /// Load the manager configuration at `path` and every search configuration
    /// it lists. Search configuration paths are relative to the directory
    /// holding the manager file.
    pub fn load(path: impl AsRef<Path>, overrides: &ManagerOverrides) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::Configuration(format!(
                "manager configuration file '{}' does not exist",
                path.display()
            )));
        }
        let mut manager: ManagerConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(manager_env())
            .extract()?;
        if let Some(glob) = &overrides.glob {
            manager.glob = glob.clone();
        }
        if let Some(outdir) = &overrides.outdir {
            manager.outdir = outdir.clone();
        }
        manager.validate()?;
        tracing::info!(path = %path.display(), "Loaded manager configuration");

        let config_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut searches = Vec::with_capacity(manager.search_configs.len());
        for fname in &manager.search_configs {
            let search_path = config_dir.join(fname);
            if !search_path.is_file() {
                return Err(AppError::Configuration(format!(
                    "search configuration file '{}' does not exist",
                    search_path.display()
                )));
            }
            let search: SearchConfig = Figment::new().merge(Yaml::file(&search_path)).extract()?;
            search.validate()?;
            tracing::info!(path = %search_path.display(), name = %search.name, "Loaded search configuration");
            searches.push(search);
        }
        Ok(Self { manager, searches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PIPELINE_YAML: &str = "\
pipeline_variables:
  cores: 8
  nodes: 'ghrss1, ghrss2'
  dates:
    GWB: '2019-01-01, 2019-01-02,2019-01-03, 2019-01-04, 2019-01-05, 2019-01-06'
    GSB: '2018-12-31'
path_variables:
  store_path: /data/ghrss/store/
  pipeline_path: /opt/ghrss
";

    fn pipeline(yaml: &str) -> PipelineConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghrss_config.yaml");
        fs::write(&path, yaml).unwrap();
        PipelineConfig::load_from(&path).unwrap()
    }

    #[test]
    fn test_derived_paths_and_nodes() {
        let config = pipeline(PIPELINE_YAML);
        assert_eq!(config.cores(), 8);
        assert_eq!(config.nodes(), vec!["ghrss1", "ghrss2"]);
        assert_eq!(config.mach_config(), MachineConfig::Multiple);
        assert_eq!(config.rfi_path(), PathBuf::from("/data/ghrss/RFI"));
        assert_eq!(config.state_path(), PathBuf::from("/data/ghrss/state"));
        assert_eq!(
            config.manager_config_path(),
            PathBuf::from("/opt/ghrss/configurations/ffa_config/manager_config.yaml")
        );
        assert!(config.validate(Backend::Gwb).is_ok());
    }

    #[test]
    fn test_analysis_dates_are_truncated() {
        let config = pipeline(PIPELINE_YAML);
        let dates = config.analysis_dates(Backend::Gwb).unwrap();
        assert_eq!(dates.len(), MAX_ANALYSIS_DATES);
        assert_eq!(dates[0], "2019-01-01");
        assert_eq!(dates[2], "2019-01-03");
        assert_eq!(config.analysis_dates(Backend::Gsb).unwrap(), vec!["2018-12-31"]);
        assert!(config.analysis_dates(Backend::Sim).is_err());
        assert!(config.validate(Backend::Sim).is_err());
    }

    #[test]
    fn test_single_node_and_zero_cores() {
        let yaml = PIPELINE_YAML
            .replace("cores: 8", "cores: 0")
            .replace("'ghrss1, ghrss2'", "ghrss1");
        let config = pipeline(&yaml);
        assert_eq!(config.mach_config(), MachineConfig::Single);
        let err = config.validate(Backend::Gwb).unwrap_err();
        assert!(err.to_string().contains("cores"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_pipeline_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load_from(dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("gwb".parse::<Backend>().unwrap(), Backend::Gwb);
        assert_eq!(" SIM ".parse::<Backend>().unwrap(), Backend::Sim);
        assert!("VLA".parse::<Backend>().is_err());
        assert_eq!(Backend::Gsb.to_string(), "GSB");
    }

    const MANAGER_YAML: &str = "\
data_format: presto
glob: /tmp/none/*.inf
outdir: /tmp/none
dm_step: 0.5
num_processes: 2
harmonic_filtering:
  enabled: false
candidate_filters:
  snr_min: 8.0
search_configs:
  - search/short.yaml
";

    const SEARCH_YAML: &str = "\
name: short
search:
  period_min: 0.5
  period_max: 2.0
  bins_min: 240
  bins_max: 260
detect:
  snr_min: 7.0
";

    fn write_setup(dir: &Path, manager: &str) -> PathBuf {
        fs::create_dir_all(dir.join("search")).unwrap();
        fs::write(dir.join("search").join("short.yaml"), SEARCH_YAML).unwrap();
        let path = dir.join("manager_config.yaml");
        fs::write(&path, manager).unwrap();
        path
    }

    #[test]
    fn test_search_setup_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_setup(dir.path(), MANAGER_YAML);
        let setup = SearchSetup::load(&path, &ManagerOverrides::default()).unwrap();

        assert_eq!(setup.manager.num_processes, 2);
        assert_eq!(setup.manager.dm_step, 0.5);
        assert!(!setup.manager.harmonic_filtering.enabled);
        assert_eq!(setup.manager.harmonic_filtering.max_denominator, 100);
        assert_eq!(setup.manager.candidate_filters.snr_min, Some(8.0));
        assert_eq!(setup.manager.candidate_filters.max_number, None);
        assert_eq!(setup.searches.len(), 1);
        assert_eq!(setup.searches[0].name, "short");
        assert_eq!(setup.searches[0].search.rmed_width, 4.0);
        assert_eq!(setup.searches[0].candidates.nbins, 128);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_setup(dir.path(), MANAGER_YAML);
        let overrides = ManagerOverrides {
            glob: Some("/elsewhere/*.inf".into()),
            outdir: Some(PathBuf::from("/elsewhere/cands")),
        };
        let setup = SearchSetup::load(&path, &overrides).unwrap();
        assert_eq!(setup.manager.glob, "/elsewhere/*.inf");
        assert_eq!(setup.manager.outdir, PathBuf::from("/elsewhere/cands"));
    }

    #[test]
    fn test_invalid_manager_values_are_fatal() {
        let dir = tempfile::tempdir().unwrap();

        let path = write_setup(dir.path(), &MANAGER_YAML.replace("num_processes: 2", "num_processes: 0"));
        let err = SearchSetup::load(&path, &ManagerOverrides::default()).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("num_processes"));

        let path = write_setup(dir.path(), &MANAGER_YAML.replace("presto", "fits"));
        assert!(SearchSetup::load(&path, &ManagerOverrides::default())
            .unwrap_err()
            .is_fatal());

        let path = write_setup(dir.path(), &MANAGER_YAML.replace("short.yaml", "long.yaml"));
        let err = SearchSetup::load(&path, &ManagerOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("long.yaml"));
    }

    #[test]
    fn test_shipped_configurations_are_valid() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("configurations");
        let pipeline = PipelineConfig::load_from(root.join("ghrss_config.yaml")).unwrap();
        assert!(pipeline.validate(Backend::Gwb).is_ok());

        let setup = SearchSetup::load(
            root.join("ffa_config").join("manager_config.yaml"),
            &ManagerOverrides::default(),
        )
        .unwrap();
        let names: Vec<&str> = setup.searches.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["short", "medium", "long"]);
    }

    #[test]
    fn test_manager_variables_stay_out_of_the_pipeline() {
        assert!(is_pipeline_env_key("pipeline_variables__cores"));
        assert!(is_pipeline_env_key("manager_config"));
        assert!(is_pipeline_env_key("MANAGER_CONFIG"));
        assert!(!is_pipeline_env_key("manager_num_processes"));
        assert!(!is_pipeline_env_key("MANAGER_HARMONIC_FILTERING__ENABLED"));

        std::env::set_var("GHRSS_FFA_MANAGER_ROUTING_CHECK", "1");
        let pipeline_keys: Vec<String> = pipeline_env()
            .iter()
            .map(|(k, _)| k.as_str().to_ascii_lowercase())
            .collect();
        let manager_keys: Vec<String> = manager_env()
            .iter()
            .map(|(k, _)| k.as_str().to_ascii_lowercase())
            .collect();
        std::env::remove_var("GHRSS_FFA_MANAGER_ROUTING_CHECK");

        assert!(pipeline_keys.iter().all(|k| !k.starts_with("manager_") || k == "manager_config"));
        assert!(manager_keys.contains(&"routing_check".to_string()));
        assert!(!manager_keys.contains(&"config".to_string()));
    }
}
