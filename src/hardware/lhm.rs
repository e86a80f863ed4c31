//! LibreHardwareMonitor backend
//!
//! LibreHardwareMonitor exposes its sensor tree as JSON from its built-in web
//! server (`Options -> Remote Web Server`, default `http://<host>:8085/data.json`).
//! The tree is nested `{ Text, Value, ImageURL, SensorId?, Type?, Children }`
//! nodes; hardware nodes carry an icon, sensors carry a value like `"45.0 °C"`.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::probe::validate_celsius;

#[derive(Error, Debug)]
pub enum LhmError {
    #[error("LibreHardwareMonitor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LibreHardwareMonitor sent an unreadable tree: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("LibreHardwareMonitor returned no {0} temperature")]
    NoSensor(&'static str),
}

/// Hardware group a sensor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareClass {
    Cpu,
    Storage,
    Other,
}

/// One temperature sensor from the tree
#[derive(Debug, Clone, PartialEq)]
pub struct LhmSensor {
    pub hardware: HardwareClass,
    pub name: String,
    pub value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LhmNode {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "Value")]
    value: String,
    #[serde(default, rename = "ImageURL")]
    image_url: String,
    #[serde(default, rename = "SensorId")]
    sensor_id: Option<String>,
    #[serde(default, rename = "Type")]
    kind: Option<String>,
    #[serde(default, rename = "Children")]
    children: Vec<LhmNode>,
}

/// Long-lived handle to the LibreHardwareMonitor web server.
#[derive(Debug, Clone)]
pub struct LhmClient {
    http: reqwest::blocking::Client,
    url: String,
}

impl LhmClient {
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, LhmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Fetch the current tree and flatten it to temperature sensors.
    pub fn sensors(&self) -> Result<Vec<LhmSensor>, LhmError> {
        let body = self.http.get(&self.url).send()?.error_for_status()?.text()?;
        Ok(parse_tree(&body)?)
    }

    pub fn cpu_temperature(&self) -> Result<f64, LhmError> {
        cpu_temperature(&self.sensors()?).ok_or(LhmError::NoSensor("CPU"))
    }

    pub fn storage_temperature(&self) -> Result<f64, LhmError> {
        storage_temperature(&self.sensors()?).ok_or(LhmError::NoSensor("storage"))
    }
}

/// Parse a `data.json` document into temperature sensors.
pub fn parse_tree(json: &str) -> serde_json::Result<Vec<LhmSensor>> {
    let tree: LhmNode = serde_json::from_str(json)?;
    Ok(flatten(&tree))
}

fn flatten(root: &LhmNode) -> Vec<LhmSensor> {
    let mut out = Vec::new();
    walk(root, HardwareClass::Other, &mut out);
    out
}

fn walk(node: &LhmNode, inherited: HardwareClass, out: &mut Vec<LhmSensor>) {
    let class = classify_icon(&node.image_url).unwrap_or(inherited);

    if node.children.is_empty() && is_temperature(node) {
        let hardware = node
            .sensor_id
            .as_deref()
            .and_then(classify_sensor_id)
            .unwrap_or(class);
        out.push(LhmSensor {
            hardware,
            name: node.text.clone(),
            value: parse_value(&node.value),
        });
        return;
    }

    for child in &node.children {
        walk(child, class, out);
    }
}

fn is_temperature(node: &LhmNode) -> bool {
    match node.kind.as_deref() {
        Some(kind) => kind.eq_ignore_ascii_case("temperature"),
        None => node.value.trim_end().ends_with("°C"),
    }
}

fn classify_icon(image_url: &str) -> Option<HardwareClass> {
    let icon = image_url.to_ascii_lowercase();
    if icon.is_empty() || icon.contains("temperature") {
        return None;
    }
    if icon.contains("cpu") {
        Some(HardwareClass::Cpu)
    } else if icon.contains("hdd") || icon.contains("nvme") || icon.contains("ssd") {
        Some(HardwareClass::Storage)
    } else if icon.contains("images_icon/") && !icon.contains("computer") {
        // Any other hardware icon (mainboard, ram, nvidia, ati, chip, ...)
        Some(HardwareClass::Other)
    } else {
        None
    }
}

fn classify_sensor_id(id: &str) -> Option<HardwareClass> {
    let id = id.to_ascii_lowercase();
    if id.starts_with("/intelcpu/") || id.starts_with("/amdcpu/") || id.starts_with("/cpu/") {
        Some(HardwareClass::Cpu)
    } else if ["/hdd/", "/nvme/", "/ssd/", "/storage/"]
        .iter()
        .any(|prefix| id.starts_with(prefix))
    {
        Some(HardwareClass::Storage)
    } else {
        None
    }
}

/// Parse `"45.0 °C"` / `"45,0 °C"` into a number.
fn parse_value(raw: &str) -> Option<f64> {
    let numeric: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    numeric.parse().ok()
}

/// Package (or total) temperature, else the first core.
pub fn cpu_temperature(sensors: &[LhmSensor]) -> Option<f64> {
    let plausible = || {
        sensors
            .iter()
            .filter(|s| s.hardware == HardwareClass::Cpu)
            .filter_map(|s| s.value.and_then(validate_celsius).map(|v| (s, v)))
    };

    plausible()
        .find(|(s, _)| {
            let name = s.name.to_lowercase();
            name.contains("package") || name.contains("total")
        })
        .or_else(|| plausible().find(|(s, _)| s.name.to_lowercase().contains("core")))
        .map(|(_, v)| v)
}

/// First plausible storage temperature.
pub fn storage_temperature(sensors: &[LhmSensor]) -> Option<f64> {
    sensors
        .iter()
        .filter(|s| s.hardware == HardwareClass::Storage)
        .find_map(|s| s.value.and_then(validate_celsius))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{
      "id": 0, "Text": "Sensor", "Min": "Min", "Value": "Value", "Max": "Max", "ImageURL": "",
      "Children": [{
        "id": 1, "Text": "POS-01", "ImageURL": "images_icon/computer.png", "Value": "",
        "Children": [
          {
            "id": 2, "Text": "Intel Core i5-8400", "ImageURL": "images_icon/cpu.png", "Value": "",
            "Children": [{
              "id": 3, "Text": "Temperatures", "ImageURL": "images_icon/temperature.png", "Value": "",
              "Children": [
                {"id": 4, "Text": "CPU Core #1", "Value": "44,0 °C", "ImageURL": "images/transparent.png", "Children": []},
                {"id": 5, "Text": "CPU Package", "Value": "47.5 °C", "ImageURL": "images/transparent.png", "Children": []}
              ]
            }, {
              "id": 6, "Text": "Load", "ImageURL": "images_icon/load.png", "Value": "",
              "Children": [
                {"id": 7, "Text": "CPU Total", "Value": "12.3 %", "ImageURL": "images/transparent.png", "Children": []}
              ]
            }]
          },
          {
            "id": 8, "Text": "Samsung SSD 970 EVO", "ImageURL": "images_icon/hdd.png", "Value": "",
            "Children": [{
              "id": 9, "Text": "Temperatures", "ImageURL": "images_icon/temperature.png", "Value": "",
              "Children": [
                {"id": 10, "Text": "Composite Temperature", "Value": "38.0 °C", "ImageURL": "images/transparent.png", "Children": []}
              ]
            }]
          }
        ]
      }]
    }"#;

    #[test]
    fn test_parse_tree_classifies_sensors() {
        let sensors = parse_tree(TREE).unwrap();
        assert_eq!(sensors.len(), 3);
        assert_eq!(sensors[0].hardware, HardwareClass::Cpu);
        assert_eq!(sensors[0].value, Some(44.0));
        assert_eq!(sensors[2].hardware, HardwareClass::Storage);
        assert_eq!(sensors[2].name, "Composite Temperature");
    }

    #[test]
    fn test_cpu_prefers_package() {
        let sensors = parse_tree(TREE).unwrap();
        assert_eq!(cpu_temperature(&sensors), Some(47.5));
    }

    #[test]
    fn test_cpu_falls_back_to_core() {
        let sensors = vec![
            LhmSensor {
                hardware: HardwareClass::Cpu,
                name: "CPU Package".into(),
                value: Some(0.0),
            },
            LhmSensor {
                hardware: HardwareClass::Cpu,
                name: "CPU Core #2".into(),
                value: Some(51.0),
            },
        ];
        assert_eq!(cpu_temperature(&sensors), Some(51.0));
    }

    #[test]
    fn test_storage_temperature() {
        let sensors = parse_tree(TREE).unwrap();
        assert_eq!(storage_temperature(&sensors), Some(38.0));
    }

    #[test]
    fn test_sensor_id_overrides_icon() {
        let json = r#"{"Text": "Sensor", "Children": [
            {"Text": "Board", "ImageURL": "images_icon/mainboard.png", "Children": [
                {"Text": "Drive", "Value": "41.0 °C", "Type": "Temperature", "SensorId": "/nvme/0/temperature/0", "Children": []},
                {"Text": "Fan #1", "Value": "900 RPM", "Type": "Fan", "SensorId": "/lpc/nct6798d/fan/0", "Children": []}
            ]}
        ]}"#;
        let sensors = parse_tree(json).unwrap();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].hardware, HardwareClass::Storage);
        assert_eq!(storage_temperature(&sensors), Some(41.0));
        assert_eq!(cpu_temperature(&sensors), None);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse_tree("not json").is_err());
        assert!(parse_tree("{}").unwrap().is_empty());

        let garbage = r#"{"Children": [{"ImageURL": "images_icon/cpu.png", "Children": [
            {"Text": "CPU Package", "Value": "n/a °C", "Children": []}
        ]}]}"#;
        let sensors = parse_tree(garbage).unwrap();
        assert_eq!(sensors[0].value, None);
        assert_eq!(cpu_temperature(&sensors), None);
    }

    #[test]
    fn test_unreachable_server_is_error() {
        // Port 9 (discard) on localhost is essentially never an HTTP server
        let client =
            LhmClient::connect("http://127.0.0.1:9/data.json", Duration::from_millis(300)).unwrap();
        assert!(client.cpu_temperature().is_err());
    }
}
