//! Battery readings from the power-supply class in sysfs.

use std::path::Path;

/// Battery status.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryReading {
    /// 0–100, `None` when no battery is present.
    pub level: Option<u8>,
    /// Degrees Celsius, `None` when the battery does not report it.
    pub temperature_c: Option<f64>,
    pub charging: bool,
}

impl BatteryReading {
    /// Scan `<power_supply_root>/*` for the first supply of type `Battery`.
    pub fn read(power_supply_root: &Path) -> Self {
        let Ok(entries) = std::fs::read_dir(power_supply_root) else {
            return Self::default();
        };
        let mut supplies: Vec<_> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
        supplies.sort();

        supplies
            .iter()
            .find(|dir| read_trimmed(&dir.join("type")).as_deref() == Some("Battery"))
            .map(|dir| Self::from_supply(dir))
            .unwrap_or_default()
    }

    fn from_supply(dir: &Path) -> Self {
        let level = read_trimmed(&dir.join("capacity"))
            .and_then(|v| v.parse::<u8>().ok())
            .map(|v| v.min(100));
        // sysfs reports tenths of a degree
        let temperature_c = read_trimmed(&dir.join("temp"))
            .and_then(|v| v.parse::<i64>().ok())
            .map(|t| t as f64 / 10.0);
        let charging = matches!(
            read_trimmed(&dir.join("status")).as_deref(),
            Some("Charging") | Some("Full")
        );
        Self { level, temperature_c, charging }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn supply(root: &Path, name: &str, files: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
    }

    #[test]
    fn reads_first_battery() {
        let tmp = tempfile::tempdir().unwrap();
        supply(tmp.path(), "AC", &[("type", "Mains\n"), ("online", "1\n")]);
        supply(
            tmp.path(),
            "BAT0",
            &[("type", "Battery\n"), ("capacity", "42\n"), ("temp", "365\n"), ("status", "Discharging\n")],
        );

        let b = BatteryReading::read(tmp.path());
        assert_eq!(b.level, Some(42));
        assert_eq!(b.temperature_c, Some(36.5));
        assert!(!b.charging);
    }

    #[test]
    fn battery_without_temperature() {
        let tmp = tempfile::tempdir().unwrap();
        supply(tmp.path(), "BAT1", &[("type", "Battery"), ("capacity", "100"), ("status", "Full")]);
        let b = BatteryReading::read(tmp.path());
        assert_eq!(b.level, Some(100));
        assert_eq!(b.temperature_c, None);
        assert!(b.charging);
    }

    #[test]
    fn no_battery_present() {
        let tmp = tempfile::tempdir().unwrap();
        supply(tmp.path(), "AC", &[("type", "Mains")]);
        assert_eq!(BatteryReading::read(tmp.path()), BatteryReading::default());
        assert_eq!(BatteryReading::read(Path::new("/nonexistent")), BatteryReading::default());
    }
}
