//! CSV output of reconciled subnets.

use crate::models::tags::NAME_TAG_KEY;
use crate::models::{num_aws_hosts, SubnetSpec, Subnets};
use crate::state::ClusterNetwork;

use super::terminal::{format_field, status_line};

/// One printable subnet line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetPrintRow {
    pub j: usize,
    pub subnet_id: String,
    pub subnet_cidr: String,
    pub broadcast: String,
    pub az_hosts: String,
    pub zone: String,
    pub role: String,
    pub route_table: String,
    pub nat_gateway: String,
    pub name: String,
}

impl SubnetPrintRow {
    fn new(j: usize, s: &SubnetSpec) -> Self {
        let dash = || "-".to_string();
        SubnetPrintRow {
            j,
            subnet_id: s.id.clone().unwrap_or_else(dash),
            subnet_cidr: s.cidr_block.map(|c| c.to_string()).unwrap_or_else(dash),
            broadcast: s
                .cidr_block
                .and_then(|c| c.broadcast().ok())
                .map(|b| b.addr.to_string())
                .unwrap_or_else(dash),
            az_hosts: s
                .cidr_block
                .and_then(|c| num_aws_hosts(c.mask).ok())
                .map(|h| h.to_string())
                .unwrap_or_else(dash),
            zone: s.availability_zone.clone(),
            role: if s.is_secondary() {
                format!("{}-secondary", s.role())
            } else {
                s.role().to_string()
            },
            route_table: s.route_table_id.clone().unwrap_or_else(dash),
            nat_gateway: s.nat_gateway_id.clone().unwrap_or_else(dash),
            name: s.tags.get(NAME_TAG_KEY).cloned().unwrap_or_default(),
        }
    }
}

/// Rows for `subnets`, numbered from 1 in list order.
pub fn subnet_rows(subnets: &Subnets) -> Vec<SubnetPrintRow> {
    subnets
        .iter()
        .enumerate()
        .map(|(i, s)| SubnetPrintRow::new(i + 1, s))
        .collect()
}

/// Print the subnets of `network` as CSV to stdout, followed by its status.
pub fn subnet_print(network: &ClusterNetwork) {
    log::info!(
        "#Start subnet_print() cluster={} subnets={}",
        network.cluster_name,
        network.subnets.len()
    );

    println!(
        r#" "cnt",  "subnet_id",          "subnet_cidr",   "broadcast",      "hosts",       "zone",     "role",          "route_table",          "nat_gateway",   "name""#
    );
    for row in subnet_rows(&network.subnets) {
        println!("{}", format_csv_row(&row));
    }
    println!("{}", status_line(network));
}

/// Format a single CSV row.
pub fn format_csv_row(row: &SubnetPrintRow) -> String {
    format!(
        r#"{j},{subnet_id},{subnet_cidr},{broadcast},{hosts},{zone},{role},{route_table},{nat_gateway},{name}"#,
        j = format_field(row.j, 6),
        subnet_id = format_field(&row.subnet_id, 22),
        subnet_cidr = format_field(&row.subnet_cidr, 18),
        broadcast = format_field(format!("{}_br", row.broadcast), 19),
        hosts = format_field(format!("{}_hosts", row.az_hosts), 14),
        zone = format_field(&row.zone, 12),
        role = format_field(&row.role, 18),
        route_table = format_field(&row.route_table, 24),
        nat_gateway = format_field(&row.nat_gateway, 16),
        name = format_field(&row.name, 30),
    )
}
