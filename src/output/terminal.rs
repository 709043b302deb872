//! Terminal output utilities.

use crate::state::{ClusterNetwork, SUBNETS_READY, VPC_READY};
use colored::Colorize;

/// Format a value as a quoted, right-aligned field of at least `width` chars.
pub fn format_field<T: ToString>(value: T, width: usize) -> String {
    let quoted = format!("\"{}\"", value.to_string());
    if quoted.len() >= width {
        quoted
    } else {
        format!("{quoted:>width$}")
    }
}

fn condition_text(network: &ClusterNetwork, name: &str) -> String {
    match network.conditions.get(name) {
        None => format!("{name}=Unknown").yellow().to_string(),
        Some(c) if c.status => format!("{name}=True").green().to_string(),
        Some(c) => format!("{name}=False({})", c.reason).red().to_string(),
    }
}

/// One line summarizing the VPC and its readiness conditions.
pub fn status_line(network: &ClusterNetwork) -> String {
    let vpc_id = network.vpc.id.as_deref().unwrap_or("-");
    let cidr = network
        .vpc
        .cidr_block
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "# cluster={} vpc={} cidr={} {} {}",
        network.cluster_name,
        vpc_id,
        cidr,
        condition_text(network, VPC_READY),
        condition_text(network, SUBNETS_READY),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_field_short() {
        assert_eq!(format_field("test", 10), "    \"test\"");
    }

    #[test]
    fn test_format_field_long() {
        assert_eq!(format_field("long_value", 5), "\"long_value\"");
    }

    #[test]
    fn test_format_field_number() {
        assert_eq!(format_field(42, 6), "  \"42\"");
    }

    #[test]
    fn test_status_line() {
        colored::control::set_override(false);
        let mut network = ClusterNetwork::new("test");
        network.vpc.id = Some("vpc-1".to_string());
        network.mark_true(VPC_READY);
        network.mark_false(SUBNETS_READY, "InvalidTopology");

        assert_eq!(
            status_line(&network),
            "# cluster=test vpc=vpc-1 cidr=- VpcReady=True SubnetsReady=False(InvalidTopology)"
        );
    }

    #[test]
    fn test_status_line_unknown() {
        colored::control::set_override(false);
        let line = status_line(&ClusterNetwork::new("test"));
        assert!(line.ends_with("VpcReady=Unknown SubnetsReady=Unknown"), "{line}");
    }
}
