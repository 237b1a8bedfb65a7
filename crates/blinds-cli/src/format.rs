//! Output formatting for devices and events.

use time::format_description::well_known::Rfc3339;

use blinds_core::{BlindsEvent, DeviceId, DeviceStatus};
use blinds_types::Position;

use crate::config::Config;

/// Describe a position, naming the preset when it is one.
pub fn describe_position(percent: u32) -> String {
    match Position::from_percent(percent) {
        Some(position) => format!("{}% ({})", percent, position.label()),
        None => format!("{}%", percent),
    }
}

fn describe_device(device: &DeviceId, config: &Config) -> String {
    match config.alias_for(device) {
        Some(alias) => format!("{} ({})", device, alias),
        None => device.to_string(),
    }
}

fn optional_percent(value: Option<u32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}%", v))
}

/// Table of device statuses.
pub fn format_status_table(statuses: &[DeviceStatus], config: &Config) -> String {
    use tabled::settings::Style;
    use tabled::{Table, Tabled};

    if statuses.is_empty() {
        return "No blinds controllers found.\n".to_string();
    }

    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "Device")]
        device: String,
        #[tabled(rename = "Link")]
        link: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Written")]
        written: String,
    }

    let rows: Vec<StatusRow> = statuses
        .iter()
        .map(|s| StatusRow {
            device: describe_device(&s.device, config),
            link: s.link.to_string(),
            target: optional_percent(s.to_write),
            written: optional_percent(s.written),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!("{}\n", table)
}

/// One line describing an event.
pub fn format_event(event: &BlindsEvent, config: &Config) -> String {
    match event {
        BlindsEvent::Changed { device, value, at } => format!(
            "{}  {}  {}",
            at.format(&Rfc3339).unwrap_or_else(|_| at.to_string()),
            describe_device(device, config),
            describe_position(*value)
        ),
        BlindsEvent::Missing { device, at } => format!(
            "{}  {}  missing",
            at.format(&Rfc3339).unwrap_or_else(|_| at.to_string()),
            describe_device(device, config)
        ),
        _ => format!("{:?}", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinds_core::LinkState;
    use time::OffsetDateTime;

    fn status(n: u8, link: LinkState, to_write: Option<u32>, written: Option<u32>) -> DeviceStatus {
        DeviceStatus {
            device: DeviceId::new(format!("03:80:E1:00:00:{:02X}", n)),
            link,
            expect_disconnect: false,
            to_write,
            written,
        }
    }

    #[test]
    fn test_describe_position() {
        assert_eq!(describe_position(100), "100% (100% Open)");
        assert_eq!(describe_position(0), "0% (Close)");
        assert_eq!(describe_position(37), "37%");
    }

    #[test]
    fn test_status_table() {
        let mut config = Config::default();
        config
            .aliases
            .insert("office".to_string(), "03:80:E1:00:00:01".to_string());

        let table = format_status_table(
            &[
                status(1, LinkState::Ready, Some(50), Some(50)),
                status(2, LinkState::Connecting, None, None),
            ],
            &config,
        );
        for header in ["Device", "Link", "Target", "Written"] {
            assert!(table.contains(header), "missing header {}", header);
        }

        let ready = table.lines().find(|l| l.contains("(office)")).unwrap();
        assert!(ready.contains("ready"));
        assert_eq!(ready.matches("50%").count(), 2);

        let connecting = table
            .lines()
            .find(|l| l.contains("03:80:E1:00:00:02"))
            .unwrap();
        assert!(connecting.contains("connecting"));
        assert_eq!(connecting.matches(" - ").count(), 2);
        assert!(table.ends_with('\n'));
    }

    #[test]
    fn test_empty_status_table() {
        assert_eq!(
            format_status_table(&[], &Config::default()),
            "No blinds controllers found.\n"
        );
    }

    #[test]
    fn test_format_event() {
        let device = DeviceId::new("03:80:E1:00:00:02");
        let changed = BlindsEvent::Changed {
            device: device.clone(),
            value: 25,
            at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(
            format_event(&changed, &Config::default()),
            "1970-01-01T00:00:00Z  03:80:E1:00:00:02  25% (25% Open)"
        );

        let missing = BlindsEvent::Missing {
            device,
            at: OffsetDateTime::UNIX_EPOCH,
        };
        assert!(format_event(&missing, &Config::default()).ends_with("missing"));
    }
}
