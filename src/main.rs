use aws_subnet_reconcile::cloud::{read_cloud_snapshot, write_cloud_snapshot, CloudSnapshot, MemoryCloud};
use aws_subnet_reconcile::events::LogEventRecorder;
use aws_subnet_reconcile::models::FAKE_REGION;
use aws_subnet_reconcile::output::subnet_print;
use aws_subnet_reconcile::{ClusterNetwork, Config, GarbageCollector, JsonFileStore, NetworkService, StateStore};
use std::error::Error;
use std::path::Path;

const USAGE: &str = "usage: aws-subnet-reconcile [reconcile|delete]";

fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    log4rs::init_file("log4rs.yml", Default::default())?;
    log::info!("#Start main()");

    let config = Config::from_env()?;
    let command = std::env::args().nth(1).unwrap_or_else(|| "reconcile".to_string());

    let store = JsonFileStore::new(&config.state_file);
    let mut network = if Path::new(&config.state_file).exists() {
        store.load()?
    } else {
        ClusterNetwork::new(&config.cluster_name)
    };
    config.apply_defaults(&mut network);

    let snapshot = if Path::new(&config.cloud_snapshot).exists() {
        read_cloud_snapshot(&config.cloud_snapshot)?
    } else {
        let zones: Vec<String> = ["a", "b", "c"].iter().map(|z| format!("{FAKE_REGION}{z}")).collect();
        let zones: Vec<&str> = zones.iter().map(String::as_str).collect();
        CloudSnapshot::with_zones(FAKE_REGION, &zones)
    };
    let cloud = MemoryCloud::new(snapshot);
    let recorder = LogEventRecorder::new(&network.cluster_name);
    let service = NetworkService::new(&cloud, &recorder, &store, &config);

    let result = match command.as_str() {
        "reconcile" => service.reconcile_network(&mut network),
        "delete" => GarbageCollector::with_strategy(&cloud, &recorder, config.gc_strategy)
            .reconcile_delete(&network)
            .and_then(|()| service.delete_network(&mut network)),
        _ => return Err(USAGE.into()),
    };

    subnet_print(&network);
    write_cloud_snapshot(&config.cloud_snapshot, &cloud.snapshot())?;
    result?;
    Ok(())
}
