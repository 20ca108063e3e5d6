//! Serviceability lookups against the imported hierarchy.

mod locate;

use serde::Serialize;
use tracing::debug;

use crate::error::ResolveError;
use crate::models::{parse_pincode, Area};
use crate::store::HierarchyStore;

pub use locate::LocationResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMethod {
    PincodeExists,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceabilityResult {
    pub is_serviceable: bool,
    pub city: Option<String>,
    pub city_id: Option<String>,
    pub area: Option<String>,
    pub area_id: Option<String>,
    pub matched_pincode: Option<u32>,
    pub check_method: Option<CheckMethod>,
}

impl ServiceabilityResult {
    /// Not serviceable, nothing matched.
    pub fn unmatched() -> Self {
        Self::default()
    }
}

/// Pick the area a hint refers to: exact name, then substring either way,
/// then the first area.
fn match_area<'a>(areas: &'a [Area], hint: &str) -> Option<&'a Area> {
    let hint = hint.to_lowercase();
    let lowered: Vec<String> = areas.iter().map(|a| a.name.to_lowercase()).collect();

    lowered
        .iter()
        .position(|name| *name == hint)
        .or_else(|| {
            lowered
                .iter()
                .position(|name| hint.contains(name.as_str()) || name.contains(hint.as_str()))
        })
        .map(|i| &areas[i])
        .or_else(|| areas.first())
}

#[derive(Clone)]
pub struct ServiceabilityResolver {
    store: HierarchyStore,
}

impl ServiceabilityResolver {
    pub fn new(store: HierarchyStore) -> Self {
        Self { store }
    }

    /// Whether `pincode` is served, and by which city and area.
    ///
    /// A pincode present in the hierarchy is serviceable; the city and area
    /// `is_active`/`is_serviceable` flags are not consulted. Missing or
    /// malformed input yields an unmatched result, while a store failure is
    /// returned as an error so callers can tell "unknown" from "no".
    pub fn check_serviceability(
        &self,
        pincode: Option<&str>,
        area_hint: Option<&str>,
    ) -> Result<ServiceabilityResult, ResolveError> {
        let Some(code) = pincode.and_then(parse_pincode) else {
            return Ok(ServiceabilityResult::unmatched());
        };
        let Some(record) = self.store.find_pincode(code)? else {
            debug!("Pincode {} not in hierarchy", code);
            return Ok(ServiceabilityResult::unmatched());
        };

        let mut result = ServiceabilityResult {
            is_serviceable: true,
            matched_pincode: Some(code),
            check_method: Some(CheckMethod::PincodeExists),
            ..ServiceabilityResult::default()
        };

        let Some(city_id) = record.city_id else {
            return Ok(result);
        };
        if let Some(city) = self.store.get_city(&city_id)? {
            result.city = Some(city.name);
        }
        result.city_id = Some(city_id.clone());

        let hint = area_hint.map(str::trim).filter(|h| !h.is_empty());
        if let Some(hint) = hint {
            let mut areas = Vec::with_capacity(record.area_ids.len());
            for area_id in &record.area_ids {
                if let Some(area) = self.store.get_area(&city_id, area_id)? {
                    areas.push(area);
                }
            }
            if let Some(area) = match_area(&areas, hint) {
                result.area = Some(area.name.clone());
                result.area_id = Some(area.id.clone());
            }
        }

        Ok(result)
    }
}
