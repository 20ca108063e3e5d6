//! Turns fetched pincode data into the City → Area → SubArea → Pincode
//! write-set and applies it as a full replacement.

use geo::{Centroid, MultiPoint, Point};
use hashbrown::{HashMap, HashSet};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PincodeData;
use crate::error::StoreError;
use crate::models::{
    Area, AreaMetadata, AreaType, City, GeoPoint, ImportCounts, ImportJob, LatLng, Pincode,
    PincodeMetadata, SubArea, SubAreaDetails, SubAreaType,
};
use crate::slug::slugify;
use crate::store::{HierarchySnapshot, HierarchyStore};

/// Builds and persists a city's hierarchy from postal index results.
#[derive(Clone)]
pub struct HierarchyBuilder {
    store: HierarchyStore,
}

/// Arithmetic mean of the valid points, `None` if there are none.
pub fn centroid(points: &[LatLng]) -> Option<LatLng> {
    let valid: Vec<Point<f64>> = points
        .iter()
        .filter(|p| p.is_valid())
        .map(|p| Point::new(p.lng, p.lat))
        .collect();
    MultiPoint::from(valid)
        .centroid()
        .map(|c| LatLng::new(c.y(), c.x()))
}

fn row_id(kind: &str, key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", kind, key).as_bytes()).to_string()
}

fn non_empty_slug(input: &str, fallback: &str) -> String {
    let slug = slugify(input);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

impl HierarchyBuilder {
    pub fn new(store: HierarchyStore) -> Self {
        Self { store }
    }

    /// Compute the replacement rows for `city`.
    ///
    /// Results are grouped by pincode (first result per pincode wins) and
    /// emitted in ascending pincode order. Row ids are derived from the city
    /// and slug, so identical input yields identical rows.
    pub fn build(city: &City, results: &[PincodeData]) -> HierarchySnapshot {
        let mut groups: BTreeMap<u32, &PincodeData> = BTreeMap::new();
        for data in results {
            match groups.entry(data.pincode) {
                Entry::Vacant(slot) => {
                    slot.insert(data);
                }
                Entry::Occupied(_) => {
                    debug!("Duplicate result for pincode {}, keeping first", data.pincode);
                }
            }
        }

        // Phase 1: one area per pincode with at least one post office
        let mut areas = Vec::with_capacity(groups.len());
        let mut taken_names: HashSet<String> = HashSet::new();
        for (&pincode, data) in &groups {
            if data.post_offices.is_empty() {
                debug!("Pincode {} has no post offices, skipping", pincode);
                continue;
            }

            let names: Vec<&str> = data
                .post_offices
                .iter()
                .map(|po| po.name.as_str())
                .filter(|n| !n.is_empty())
                .collect();
            let mut name = if names.is_empty() {
                format!("{} - {}", data.district, pincode)
            } else {
                names.join(", ")
            };
            if !taken_names.insert(name.to_lowercase()) {
                name = format!("{} ({})", name, pincode);
                taken_names.insert(name.to_lowercase());
            }

            let slug = format!(
                "{}-{}-{}",
                non_empty_slug(&data.district, "area"),
                pincode,
                city.id
            );
            let coords: Vec<LatLng> = data
                .post_offices
                .iter()
                .filter_map(|po| po.coordinates)
                .collect();
            let center = centroid(&coords);
            if center.is_none() {
                debug!("No geocoded post office for {}, using (0,0)", pincode);
            }

            areas.push(Area {
                id: row_id("area", &slug),
                city_id: city.id.clone(),
                name,
                slug,
                area_type: AreaType::Locality,
                centroid: center.map(GeoPoint::from).unwrap_or(GeoPoint::UNKNOWN),
                pincode,
                metadata: AreaMetadata {
                    sub_area_count: data.post_offices.len(),
                    district: data.district.clone(),
                    state: data.state.clone(),
                    average_coordinates: center.map(GeoPoint::from),
                },
                is_serviceable: true,
                priority: 0,
            });
        }

        // Phase 2: pincode -> area lookup from the areas just built
        let area_by_pincode: HashMap<u32, usize> = areas
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.pincode, idx))
            .collect();

        let mut sub_areas = Vec::new();
        let mut pincodes = Vec::with_capacity(areas.len());
        for (&pincode, data) in &groups {
            let Some(area) = area_by_pincode.get(&pincode).map(|&idx| &areas[idx]) else {
                continue;
            };

            for (ordinal, po) in data.post_offices.iter().enumerate() {
                let name = if po.name.is_empty() {
                    area.name.clone()
                } else {
                    po.name.clone()
                };
                let slug = format!(
                    "{}-{}-{}",
                    non_empty_slug(&name, "post-office"),
                    pincode,
                    ordinal + 1
                );
                let coordinates = po
                    .coordinates
                    .filter(|c| c.is_valid())
                    .map(GeoPoint::from)
                    .unwrap_or(GeoPoint::UNKNOWN);

                sub_areas.push(SubArea {
                    id: row_id("sub_area", &format!("{}:{}", city.id, slug)),
                    area_id: area.id.clone(),
                    city_id: city.id.clone(),
                    name,
                    slug,
                    pincode,
                    sub_area_type: SubAreaType::from_branch_type(&po.branch_type),
                    coordinates,
                    details: SubAreaDetails {
                        branch_type: po.branch_type.clone(),
                        delivery_status: po.delivery_status.clone(),
                        district: po.district.clone(),
                        state: po.state.clone(),
                        division: po.division.clone(),
                        region: po.region.clone(),
                    },
                    is_serviceable: true,
                    priority: 0,
                });
            }

            // Phase 3: first geocoded post office wins the pincode coordinate
            let coordinates = data
                .post_offices
                .iter()
                .filter_map(|po| po.coordinates)
                .find(|c| c.is_valid())
                .map(GeoPoint::from)
                .unwrap_or(GeoPoint::UNKNOWN);

            pincodes.push(Pincode {
                code: pincode,
                city_id: Some(city.id.clone()),
                area_ids: vec![area.id.clone()],
                coordinates,
                is_serviceable: true,
                metadata: PincodeMetadata {
                    district: data.district.clone(),
                    state: data.state.clone(),
                    sub_area_count: data.post_offices.len(),
                    primary_area_name: area.name.clone(),
                },
            });
        }

        let state = groups
            .values()
            .map(|d| d.state.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string);

        HierarchySnapshot {
            areas,
            sub_areas,
            pincodes,
            state,
        }
    }

    /// Replace everything imported for `city` with the rows built from
    /// `results` and complete `job_id`, atomically.
    pub fn replace(
        &self,
        city: &City,
        results: &[PincodeData],
        job_id: &str,
        duration: Duration,
    ) -> Result<(ImportCounts, ImportJob), StoreError> {
        let snapshot = Self::build(city, results);
        if snapshot.areas.is_empty() {
            warn!("Import for {} produced no areas", city.slug);
        }
        info!(
            "Writing hierarchy for {}: {} areas, {} sub-areas, {} pincodes",
            city.slug,
            snapshot.areas.len(),
            snapshot.sub_areas.len(),
            snapshot.pincodes.len()
        );
        self.store
            .replace_city_hierarchy_for_job(&city.id, &snapshot, job_id, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CityMetadata, PincodeRange};
    use crate::providers::PostOffice;
    use crate::testing::office;

    fn city() -> City {
        City {
            id: "4f1c8a4e-6a7b-4f0e-9a51-1d1b2c3d4e5f".into(),
            name: "Pune".into(),
            slug: "pune".into(),
            state: None,
            country: "India".into(),
            center: GeoPoint::from(LatLng::new(18.52, 73.85)),
            pincode_ranges: vec![PincodeRange::new(411001, 411062)],
            metadata: CityMetadata::default(),
            is_active: true,
        }
    }

    fn data(pincode: u32, post_offices: Vec<PostOffice>) -> PincodeData {
        PincodeData {
            pincode,
            main_area: post_offices.first().map(|po| po.name.clone()),
            district: "Pune".into(),
            state: "Maharashtra".into(),
            post_offices,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_centroid_ignores_missing_coordinates() {
        let results = vec![data(
            411001,
            vec![
                office("Camp", "Sub Post Office", Some((10.0, 20.0))),
                office("Koregaon Park", "Sub Post Office", Some((30.0, 40.0))),
                office("Wanowrie", "Branch Post Office", None),
            ],
        )];
        let snapshot = HierarchyBuilder::build(&city(), &results);

        assert_eq!(snapshot.areas.len(), 1);
        let centroid = snapshot.areas[0].centroid.to_lat_lng();
        assert!(close(centroid.lat, 20.0));
        assert!(close(centroid.lng, 30.0));
        assert_eq!(snapshot.sub_areas.len(), 3);
        assert!(snapshot.sub_areas[2].coordinates.is_unknown());
    }

    #[test]
    fn test_ungeocoded_pincode_uses_sentinel() {
        let results = vec![data(411002, vec![office("Bhavani Peth", "Sub Post Office", None)])];
        let snapshot = HierarchyBuilder::build(&city(), &results);

        assert!(snapshot.areas[0].centroid.is_unknown());
        assert!(snapshot.areas[0].metadata.average_coordinates.is_none());
        assert!(snapshot.pincodes[0].coordinates.is_unknown());
    }

    #[test]
    fn test_pincode_takes_first_geocoded_office() {
        let results = vec![data(
            411001,
            vec![
                office("Camp", "Sub Post Office", None),
                office("Koregaon Park", "Sub Post Office", Some((18.53, 73.89))),
                office("Wanowrie", "Branch Post Office", Some((18.49, 73.90))),
            ],
        )];
        let snapshot = HierarchyBuilder::build(&city(), &results);
        assert_eq!(snapshot.pincodes[0].coordinates.coordinates, [73.89, 18.53]);
    }

    #[test]
    fn test_area_naming_and_links() {
        let c = city();
        let results = vec![data(
            411001,
            vec![
                office("Camp", "Head Post Office", None),
                office("Koregaon Park", "Sub Post Office", None),
            ],
        )];
        let snapshot = HierarchyBuilder::build(&c, &results);
        let area = &snapshot.areas[0];

        assert_eq!(area.name, "Camp, Koregaon Park");
        assert_eq!(area.slug, format!("pune-411001-{}", c.id));
        assert_eq!(area.metadata.sub_area_count, 2);
        assert_eq!(snapshot.pincodes[0].area_ids, vec![area.id.clone()]);
        assert_eq!(snapshot.pincodes[0].metadata.primary_area_name, area.name);
        assert!(snapshot.sub_areas.iter().all(|s| s.area_id == area.id));
        assert_eq!(snapshot.sub_areas[0].sub_area_type, SubAreaType::HeadPostOffice);
        assert_eq!(snapshot.sub_areas[0].slug, "camp-411001-1");
        assert_eq!(snapshot.sub_areas[1].slug, "koregaon-park-411001-2");
        assert_eq!(snapshot.state.as_deref(), Some("Maharashtra"));
    }

    #[test]
    fn test_nameless_offices_fall_back_to_district() {
        let results = vec![data(411005, vec![office("", "Branch Post Office", None)])];
        let snapshot = HierarchyBuilder::build(&city(), &results);
        assert_eq!(snapshot.areas[0].name, "Pune - 411005");
    }

    #[test]
    fn test_duplicate_pincodes_collapse_to_first() {
        let results = vec![
            data(411001, vec![office("Camp", "Sub Post Office", None)]),
            data(411001, vec![office("Other", "Sub Post Office", None)]),
        ];
        let snapshot = HierarchyBuilder::build(&city(), &results);
        assert_eq!(snapshot.areas.len(), 1);
        assert_eq!(snapshot.areas[0].name, "Camp");
        assert_eq!(snapshot.sub_areas.len(), 1);
    }

    #[test]
    fn test_colliding_area_names_are_disambiguated() {
        let results = vec![
            data(411001, vec![office("Camp", "Sub Post Office", None)]),
            data(411040, vec![office("Camp", "Sub Post Office", None)]),
        ];
        let snapshot = HierarchyBuilder::build(&city(), &results);
        assert_eq!(snapshot.areas[0].name, "Camp");
        assert_eq!(snapshot.areas[1].name, "Camp (411040)");
    }

    #[test]
    fn test_build_is_deterministic() {
        let results = vec![
            data(411002, vec![office("Bhavani Peth", "Sub Post Office", Some((18.5, 73.86)))]),
            data(411001, vec![office("Camp", "Sub Post Office", None)]),
        ];
        let first = HierarchyBuilder::build(&city(), &results);
        let second = HierarchyBuilder::build(&city(), &results);
        assert_eq!(first, second);
        assert_eq!(first.areas[0].pincode, 411001);
    }

    #[test]
    fn test_empty_offices_are_skipped() {
        let results = vec![data(411009, Vec::new())];
        let snapshot = HierarchyBuilder::build(&city(), &results);
        assert!(snapshot.areas.is_empty());
        assert!(snapshot.pincodes.is_empty());
    }
}
