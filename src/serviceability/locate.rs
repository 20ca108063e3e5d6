use tracing::debug;

use super::{ServiceabilityResolver, ServiceabilityResult};
use crate::error::ResolveError;
use crate::models::LatLng;
use crate::providers::Geocoder;

/// Coordinate → postal address → serviceability.
pub struct LocationResolver<G> {
    geocoder: G,
    resolver: ServiceabilityResolver,
}

impl<G: Geocoder> LocationResolver<G> {
    pub fn new(geocoder: G, resolver: ServiceabilityResolver) -> Self {
        Self { geocoder, resolver }
    }

    /// Reverse-geocode `(lat, lng)` and check the pincode found there, using
    /// the address locality as the area hint.
    ///
    /// A coordinate with no resolvable pincode is `AddressUnavailable`, not an
    /// unserviceable result.
    pub async fn locate(&self, lat: f64, lng: f64) -> Result<ServiceabilityResult, ResolveError> {
        let point = LatLng::new(lat, lng);
        if !point.is_valid() {
            return Err(ResolveError::AddressUnavailable { lat, lng });
        }

        let address = self
            .geocoder
            .reverse(point)
            .await
            .filter(|a| a.pincode.is_some())
            .ok_or(ResolveError::AddressUnavailable { lat, lng })?;
        debug!(
            "({}, {}) resolved to {:?} / {:?}",
            lat, lng, address.pincode, address.locality
        );

        self.resolver
            .check_serviceability(address.pincode.as_deref(), address.locality.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, Pincode, PincodeMetadata};
    use crate::providers::ReverseAddress;
    use crate::store::{HierarchySnapshot, HierarchyStore};
    use crate::testing::MockGeocoder;

    fn resolver() -> ServiceabilityResolver {
        let store = HierarchyStore::temporary().unwrap();
        let city = store
            .upsert_city_for_import("Pune", "India", LatLng::new(18.52, 73.85), &[])
            .unwrap();
        let snapshot = HierarchySnapshot {
            pincodes: vec![Pincode {
                code: 411001,
                city_id: Some(city.id.clone()),
                area_ids: Vec::new(),
                coordinates: GeoPoint::UNKNOWN,
                is_serviceable: true,
                metadata: PincodeMetadata {
                    district: "Pune".into(),
                    state: "Maharashtra".into(),
                    sub_area_count: 0,
                    primary_area_name: String::new(),
                },
            }],
            ..Default::default()
        };
        store.replace_city_hierarchy(&city.id, &snapshot).unwrap();
        ServiceabilityResolver::new(store)
    }

    #[tokio::test]
    async fn test_locate_known_pincode() {
        let geocoder = MockGeocoder::new().with_reverse(ReverseAddress {
            pincode: Some("411001".into()),
            locality: Some("Camp".into()),
            city: Some("Pune".into()),
            display_name: None,
        });
        let locator = LocationResolver::new(geocoder, resolver());

        let result = locator.locate(18.51, 73.87).await.unwrap();
        assert!(result.is_serviceable);
        assert_eq!(result.city.as_deref(), Some("Pune"));
        assert_eq!(result.matched_pincode, Some(411001));
        // no areas stored for the pincode
        assert_eq!(result.area, None);
    }

    #[tokio::test]
    async fn test_locate_outside_hierarchy() {
        let geocoder = MockGeocoder::new().with_reverse(ReverseAddress {
            pincode: Some("560001".into()),
            ..Default::default()
        });
        let locator = LocationResolver::new(geocoder, resolver());

        let result = locator.locate(12.97, 77.59).await.unwrap();
        assert_eq!(result, ServiceabilityResult::unmatched());
    }

    #[tokio::test]
    async fn test_locate_without_address() {
        let geocoder = MockGeocoder::new();
        let calls = geocoder.calls();
        let locator = LocationResolver::new(geocoder, resolver());

        assert!(matches!(
            locator.locate(18.51, 73.87).await,
            Err(ResolveError::AddressUnavailable { .. })
        ));
        assert_eq!(calls.reverse(), 1);

        // out of range, never sent to the geocoder
        assert!(locator.locate(123.0, 73.87).await.is_err());
        assert_eq!(calls.reverse(), 1);
    }
}
