//! OSRM adapter against a real `osrm-routed` in docker.
//!
//! Needs docker and downloads the Turkey extract on first run, so it is
//! ignored by default: `cargo test --test osrm_integration -- --ignored`.
//! Set `OSRM_DATA_DIR` to reuse a prepared dataset.

use std::env;
use std::time::{Duration, Instant, SystemTime};

use testcontainers::ReuseDirective;
use testcontainers::core::{IntoContainerPort, Mount};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt, TestcontainersError};

use shuttle_planner::osrm::{OsrmClient, OsrmConfig};
use shuttle_planner::osrm_data::{GeofabrikRegion, OsrmDataset, OsrmDatasetConfig, OsrmProfile};
use shuttle_planner::traits::{BackendKind, DistanceMatrixProvider, RoutingBackend};

const LEVENT: (f64, f64) = (41.0822, 29.0110);
const MASLAK: (f64, f64) = (41.1097, 29.0204);
const BESIKTAS: (f64, f64) = (41.0430, 29.0070);

fn osrm_container(profile: OsrmProfile) -> Result<(Container<GenericImage>, String), TestcontainersError> {
    let data_root = env::var("OSRM_DATA_DIR").unwrap_or_else(|_| "osrm-data".to_string());
    let config = OsrmDatasetConfig::new(GeofabrikRegion::new("europe/turkey"), profile, data_root);
    let dataset = OsrmDataset::ensure(&config)
        .map_err(|err| TestcontainersError::other(format!("OSRM prep failed: {}", err)))?;

    // a re-extracted dataset gets a fresh container
    let mtime = std::fs::metadata(dataset.osrm_base.with_extension("osrm.partition"))
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);

    let container = GenericImage::new("osrm/osrm-backend", "latest")
        .with_exposed_port(5000.tcp())
        .with_mount(Mount::bind_mount(
            dataset.data_dir.to_string_lossy().to_string(),
            "/data",
        ))
        .with_cmd(dataset.routed_args())
        .with_container_name(format!("osrm-turkey-{}-{}", profile.name(), mtime))
        .with_startup_timeout(Duration::from_secs(60))
        .with_reuse(ReuseDirective::Always)
        .start()?;
    let port = container.get_host_port_ipv4(5000.tcp())?;

    Ok((container, format!("http://127.0.0.1:{}", port)))
}

/// Retries until the server has loaded its dataset.
fn wait_for<T>(mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(30) {
        if let Some(value) = attempt() {
            return Some(value);
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    None
}

#[test]
#[ignore]
fn osrm_routes_through_istanbul() {
    let (container, base_url) = osrm_container(OsrmProfile::Car).expect("start OSRM container");
    let client = OsrmClient::new(OsrmConfig {
        base_url,
        ..OsrmConfig::default()
    })
    .expect("build OSRM client");

    let leg = wait_for(|| client.route(&[LEVENT, MASLAK], None).ok()).expect("route from Levent to Maslak");

    assert_eq!(client.kind(), BackendKind::RoadNetwork);
    // roads are never shorter than the great circle (~3.2 km)
    assert!(leg.distance_m > 3000.0 && leg.distance_m < 15_000.0, "{}", leg.distance_m);
    assert!(leg.duration_s > 0.0);
    let polyline = leg.polyline.expect("full overview geometry");
    assert!(polyline.len() > 2);

    drop(container);
}

#[test]
#[ignore]
fn osrm_walking_table_has_requested_shape() {
    let (container, base_url) = osrm_container(OsrmProfile::Foot).expect("start OSRM container");
    let client = OsrmClient::new(OsrmConfig::foot(base_url)).expect("build OSRM client");

    let homes = [LEVENT, BESIKTAS];
    let stops = [MASLAK, (41.0785, 29.0108), (41.0450, 29.0040)];
    let table = wait_for(|| client.matrix_for(&homes, &stops).ok()).expect("walking table");

    assert_eq!(table.len(), homes.len());
    assert!(table.iter().all(|row| row.len() == stops.len()));
    let levent_to_nearby = table[0][1].expect("reachable on foot");
    let levent_to_maslak = table[0][0].expect("reachable on foot");
    assert!(levent_to_nearby < levent_to_maslak);

    drop(container);
}
