//! Typed records for the four JSON configuration documents (world, stations,
//! drones, missions). Unlike the layered env-var configuration style used
//! elsewhere in this workspace, these documents have a fixed literal schema,
//! so they are deserialized directly with `serde_json` rather than built up
//! from environment variables with defaults.

use crate::error::SimError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfigFile {
    pub world: WorldConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    pub dem_path: String,
    pub dem_resolution: f64,
    pub maximum_allowed_height: f64,
    pub simulation_step: f64,
    pub wireless_range: f64,
    pub drone_speed: f64,
    pub drone_life: f64,
    pub charge_power: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationsConfigFile {
    pub stations: Vec<StationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DronesConfigFile {
    pub drones: Vec<DroneConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DroneConfig {
    #[serde(rename = "isMaster")]
    pub is_master: bool,
    pub payload: Vec<String>,
    pub speed: f64,
    pub lifetime: f64,
    #[serde(rename = "payloadAgroVolume")]
    pub payload_agro_volume: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionsConfigFile {
    pub missions: Vec<MissionConfig>,
}

/// Raw, mutually-exclusive-field view of a mission entry, matching the
/// source loader's field-presence dispatch rather than a serde tag.
#[derive(Debug, Clone, Deserialize)]
pub struct MissionConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub rect: Option<[f64; 4]>,
    pub polygon: Option<Vec<[f64; 2]>>,
    #[serde(rename = "agroVolumePerSecond")]
    pub agro_volume_per_second: Option<f64>,
    pub destination: Option<[f64; 2]>,
    pub patrolrect: Option<[f64; 4]>,
    pub patrolpolygon: Option<Vec<[f64; 2]>>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SimError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn load_world(path: &Path) -> Result<WorldConfig, SimError> {
    let file: WorldConfigFile = read_json(path)?;
    Ok(file.world)
}

pub fn load_stations(path: &Path) -> Result<Vec<StationConfig>, SimError> {
    let file: StationsConfigFile = read_json(path)?;
    let controls = file.stations.iter().filter(|s| s.kind == "control").count();
    let charges = file.stations.iter().filter(|s| s.kind == "charge").count();
    if controls != 1 {
        return Err(SimError::Config(format!(
            "expected exactly one control station, found {controls}"
        )));
    }
    if charges < 1 {
        return Err(SimError::Config(
            "expected at least one charge station".into(),
        ));
    }
    Ok(file.stations)
}

pub fn load_drones(path: &Path) -> Result<Vec<DroneConfig>, SimError> {
    let file: DronesConfigFile = read_json(path)?;
    let masters = file.drones.iter().filter(|d| d.is_master).count();
    if masters != 1 {
        return Err(SimError::Config(format!(
            "expected exactly one master drone, found {masters}"
        )));
    }
    if file.drones.len() < 2 {
        return Err(SimError::Config("at least two drones are required".into()));
    }
    for drone in &file.drones {
        if drone.payload.iter().any(|p| p == "agro") && drone.payload_agro_volume.is_none() {
            return Err(SimError::Config(
                "drone carries 'agro' payload but has no payloadAgroVolume".into(),
            ));
        }
    }
    Ok(file.drones)
}

pub fn load_missions(path: &Path) -> Result<Vec<MissionConfig>, SimError> {
    let file: MissionsConfigFile = read_json(path)?;
    for (i, m) in file.missions.iter().enumerate() {
        let is_patrol = m.patrolrect.is_some() || m.patrolpolygon.is_some();
        let is_path = m.destination.is_some();
        let is_poly = m.rect.is_some() || m.polygon.is_some();
        if is_patrol as u8 + is_path as u8 + is_poly as u8 != 1 {
            return Err(SimError::Config(format!(
                "mission {i} does not have exactly one of patrol/destination/area fields"
            )));
        }
        if is_poly && m.kind.as_deref() == Some("agro") && m.agro_volume_per_second.is_none() {
            return Err(SimError::Config(format!(
                "mission {i} is type 'agro' but has no agroVolumePerSecond"
            )));
        }
    }
    Ok(file.missions)
}
