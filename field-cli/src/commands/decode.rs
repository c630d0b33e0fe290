//! Decode an encoding string.

use anyhow::{Context, Result};
use field_types::FieldDescriptor;

/// Run the decode command.
pub fn run(name: &str, encoding: &str) -> Result<()> {
    println!("{}", render(name, encoding)?);
    Ok(())
}

fn render(name: &str, encoding: &str) -> Result<String> {
    let descriptor: FieldDescriptor = field_core::decode(name, encoding);
    serde_json::to_string_pretty(&descriptor).context("Failed to serialize descriptor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn renders_descriptor_json() {
        let text = render("max_rate", "number;r;mn=0;mx=100").unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["name"], "max_rate");
        assert_eq!(value["label"], "Max Rate");
        assert_eq!(value["kind"], "number");
        assert_eq!(value["read_only"], true);
        assert_eq!(value["max"], 100.0);
    }

    #[test]
    fn renders_series_options() {
        let text = render("power", "trend;mode=barChart;xAxis=keys").unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["kind"], "trend");
        assert_eq!(value["series"]["mode"], "barChart");
        assert_eq!(value["series"]["x_axis"], "keys");
    }
}
