use crate::error::BookingError;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub duration_minutes: u32,
}

impl Service {
    fn new(id: &str, name: &str, duration_minutes: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: Vec<Service>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new(vec![
            Service::new("classic-manicure", "Classic Manicure", 30),
            Service::new("gel-manicure", "Gel Manicure", 60),
            Service::new("pedicure", "Spa Pedicure", 60),
            Service::new("nail-art", "Nail Art Design", 90),
            Service::new("acrylic-full-set", "Acrylic Full Set", 120),
        ])
    }
}

impl ServiceCatalog {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// Reads a JSON array of services.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
        let services: Vec<Service> = serde_json::from_str(&content)
            .map_err(|err| format!("Invalid service catalog {}: {err}", path.display()))?;
        if services.is_empty() {
            return Err(format!("Service catalog {} is empty", path.display()));
        }
        Ok(Self::new(services))
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn get(&self, id: &str) -> Result<&Service, BookingError> {
        self.services
            .iter()
            .find(|service| service.id == id)
            .ok_or_else(|| BookingError::UnknownService(id.into()))
    }
}
