//! Output formatting for reconciled networks.
//!
//! - [`csv`] - CSV listing of subnets
//! - [`terminal`] - Field formatting and colored status

mod csv;
mod terminal;

pub use csv::{format_csv_row, subnet_print, subnet_rows, SubnetPrintRow};
pub use terminal::{format_field, status_line};
