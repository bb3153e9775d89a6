//! Self-hosted OSRM datasets for the road-network and walking backends.
//!
//! Downloads a Geofabrik extract once, then runs the MLD pipeline
//! (`osrm-extract`, `osrm-partition`, `osrm-customize`) in the official
//! docker image. Each profile gets its own directory because extraction
//! output is profile-specific.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::OsrmDataError;

const OSRM_IMAGE: &str = "osrm/osrm-backend";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeofabrikRegion {
    /// Geofabrik path, e.g. "europe/turkey".
    pub path: String,
}

impl GeofabrikRegion {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("region")
    }

    pub fn url(&self) -> String {
        format!("https://download.geofabrik.de/{}-latest.osm.pbf", self.path)
    }

    pub fn pbf_name(&self) -> String {
        format!("{}-latest.osm.pbf", self.name())
    }
}

/// Routing profile baked into an extracted dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsrmProfile {
    Car,
    Foot,
}

impl OsrmProfile {
    pub fn name(self) -> &'static str {
        match self {
            OsrmProfile::Car => "car",
            OsrmProfile::Foot => "foot",
        }
    }

    /// Profile script inside the docker image.
    pub fn lua_path(self) -> &'static str {
        match self {
            OsrmProfile::Car => "/opt/car.lua",
            OsrmProfile::Foot => "/opt/foot.lua",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmDatasetConfig {
    pub region: GeofabrikRegion,
    pub profile: OsrmProfile,
    pub data_root: PathBuf,
}

impl OsrmDatasetConfig {
    pub fn new(region: GeofabrikRegion, profile: OsrmProfile, data_root: impl Into<PathBuf>) -> Self {
        Self {
            region,
            profile,
            data_root: data_root.into(),
        }
    }

    /// `<data_root>/<region>/<profile>`.
    pub fn data_dir(&self) -> PathBuf {
        self.data_root.join(self.region.name()).join(self.profile.name())
    }
}

#[derive(Debug, Clone)]
pub struct OsrmDataset {
    pub data_dir: PathBuf,
    pub osrm_base: PathBuf,
    pub pbf_path: PathBuf,
    pub profile: OsrmProfile,
}

impl OsrmDataset {
    /// Download and preprocess whatever is missing.
    pub fn ensure(config: &OsrmDatasetConfig) -> Result<Self, OsrmDataError> {
        let data_dir = if config.data_root.is_absolute() {
            config.data_dir()
        } else {
            std::env::current_dir()?.join(config.data_dir())
        };
        fs::create_dir_all(&data_dir)?;

        let pbf_path = data_dir.join(config.region.pbf_name());
        if !pbf_path.exists() {
            info!(url = %config.region.url(), "downloading OSM extract");
            download_pbf(&config.region.url(), &pbf_path)?;
        }

        let osrm_base = data_dir.join(format!("{}-latest.osrm", config.region.name()));
        if !osrm_base.exists() {
            info!(profile = config.profile.name(), "running osrm-extract");
            run_docker(
                &[
                    "osrm-extract",
                    "-p",
                    config.profile.lua_path(),
                    &format!("/data/{}", file_name(&pbf_path)),
                ],
                &data_dir,
            )?;
        }

        if !mld_ready(&osrm_base) {
            let target = format!("/data/{}", file_name(&osrm_base));
            run_docker(&["osrm-partition", &target], &data_dir)?;
            run_docker(&["osrm-customize", &target], &data_dir)?;
        }

        Ok(Self {
            data_dir,
            osrm_base,
            pbf_path,
            profile: config.profile,
        })
    }

    /// Arguments for `osrm-routed` serving this dataset from `/data`.
    pub fn routed_args(&self) -> Vec<String> {
        vec![
            "osrm-routed".to_string(),
            "--algorithm".to_string(),
            "mld".to_string(),
            format!("/data/{}", file_name(&self.osrm_base)),
        ]
    }
}

fn download_pbf(url: &str, dest: &Path) -> Result<(), OsrmDataError> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let tmp_path = dest.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    writer.write_all(&response.bytes()?)?;
    writer.flush()?;
    fs::rename(tmp_path, dest)?;
    Ok(())
}

fn mld_ready(osrm_base: &Path) -> bool {
    osrm_base.exists()
        && ["osrm.partition", "osrm.mldgr", "osrm.cells"]
            .iter()
            .all(|ext| osrm_base.with_extension(ext).exists())
}

fn run_docker(args: &[&str], data_dir: &Path) -> Result<(), OsrmDataError> {
    let status = Command::new("docker")
        .args(["run", "--rm", "-t", "-v"])
        .arg(format!("{}:/data", data_dir.display()))
        .arg(OSRM_IMAGE)
        .args(args)
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(OsrmDataError::ProcessFailure(format!(
            "{} exited with status {}",
            args.first().copied().unwrap_or("docker"),
            status
        )))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}
