use shared::config::StationConfig;
use shared::error::SimError;
use shared::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationKind {
    Control,
    Charge,
}

#[derive(Debug, Clone)]
pub struct Station {
    pub key: u32,
    pub kind: StationKind,
    pub x: f64,
    pub y: f64,
}

impl Station {
    pub fn position(&self) -> Point {
        (self.x, self.y)
    }
}

/// Splits the raw station list into the single control station and the
/// ordered collection of charge stations. Both are re-keyed sequentially
/// (1-based) within their own kind, not by their raw position in the file.
pub fn load_stations(configs: Vec<StationConfig>) -> Result<(Station, Vec<Station>), SimError> {
    let mut control = None;
    let mut charges = Vec::new();

    for cfg in configs {
        match cfg.kind.as_str() {
            "control" => {
                if control.is_some() {
                    return Err(SimError::Config("more than one control station".into()));
                }
                control = Some(Station {
                    key: 1,
                    kind: StationKind::Control,
                    x: cfg.x,
                    y: cfg.y,
                });
            }
            "charge" => {
                charges.push(Station {
                    key: charges.len() as u32 + 1,
                    kind: StationKind::Charge,
                    x: cfg.x,
                    y: cfg.y,
                });
            }
            other => {
                return Err(SimError::Config(format!("unknown station type '{other}'")));
            }
        }
    }

    let control = control.ok_or_else(|| SimError::Config("no control station found".into()))?;
    if charges.is_empty() {
        return Err(SimError::Config("no charge stations found".into()));
    }
    Ok((control, charges))
}

/// Time, in seconds at `speed`, to reach the nearest charge station from `from`.
pub fn time_to_nearest_charger(from: Point, charge_stations: &[Station], speed: f64) -> f64 {
    charge_stations
        .iter()
        .map(|s| shared::geometry::dist_between(from, s.position()) / speed)
        .fold(f64::INFINITY, f64::min)
}

/// Time, in seconds at `speed`, to reach the furthest charge station from `from`.
pub fn time_to_furthest_charger(from: Point, charge_stations: &[Station], speed: f64) -> f64 {
    charge_stations
        .iter()
        .map(|s| shared::geometry::dist_between(from, s.position()) / speed)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// The nearest charge station to `from`.
pub fn nearest_charger<'a>(from: Point, charge_stations: &'a [Station]) -> &'a Station {
    charge_stations
        .iter()
        .min_by(|a, b| {
            let da = shared::geometry::dist_between(from, a.position());
            let db = shared::geometry::dist_between(from, b.position());
            da.partial_cmp(&db).unwrap()
        })
        .expect("charge_stations is non-empty, enforced at load time")
}

/// The furthest charge station from `from`.
pub fn furthest_charger<'a>(from: Point, charge_stations: &'a [Station]) -> &'a Station {
    charge_stations
        .iter()
        .max_by(|a, b| {
            let da = shared::geometry::dist_between(from, a.position());
            let db = shared::geometry::dist_between(from, b.position());
            da.partial_cmp(&db).unwrap()
        })
        .expect("charge_stations is non-empty, enforced at load time")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(kind: &str, x: f64, y: f64) -> StationConfig {
        StationConfig { kind: kind.to_string(), x, y }
    }

    #[test]
    fn splits_control_and_charge() {
        let (control, charges) = load_stations(vec![
            cfg("charge", 10.0, 0.0),
            cfg("control", 0.0, 0.0),
            cfg("charge", 20.0, 0.0),
        ])
        .unwrap();
        assert_eq!(control.kind, StationKind::Control);
        assert_eq!(charges.len(), 2);
        assert_eq!(charges[0].key, 1);
        assert_eq!(charges[1].key, 2);
    }

    #[test]
    fn rejects_two_control_stations() {
        let err = load_stations(vec![cfg("control", 0.0, 0.0), cfg("control", 1.0, 1.0)]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_no_charge_stations() {
        let err = load_stations(vec![cfg("control", 0.0, 0.0)]);
        assert!(err.is_err());
    }

    #[test]
    fn nearest_and_furthest_charger() {
        let (_, charges) = load_stations(vec![
            cfg("control", 0.0, 0.0),
            cfg("charge", 10.0, 0.0),
            cfg("charge", 100.0, 0.0),
        ])
        .unwrap();
        assert_eq!(nearest_charger((0.0, 0.0), &charges).key, 1);
        assert_eq!(furthest_charger((0.0, 0.0), &charges).key, 2);
    }
}
