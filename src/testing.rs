//! Provider doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::LatLng;
use crate::providers::{Geocoder, PostOffice, PostalIndex, ReverseAddress};

#[derive(Default)]
pub struct CallCounts {
    postal: AtomicUsize,
    geocode: AtomicUsize,
    reverse: AtomicUsize,
    per_pincode: Mutex<HashMap<u32, usize>>,
}

impl CallCounts {
    pub fn postal(&self) -> usize {
        self.postal.load(Ordering::SeqCst)
    }

    pub fn geocode(&self) -> usize {
        self.geocode.load(Ordering::SeqCst)
    }

    pub fn reverse(&self) -> usize {
        self.reverse.load(Ordering::SeqCst)
    }

    pub fn attempts(&self, pincode: u32) -> usize {
        self.per_pincode
            .lock()
            .unwrap()
            .get(&pincode)
            .copied()
            .unwrap_or(0)
    }
}

pub fn office(name: &str, branch_type: &str, coordinates: Option<(f64, f64)>) -> PostOffice {
    PostOffice {
        name: name.to_string(),
        branch_type: branch_type.to_string(),
        delivery_status: "Delivery".to_string(),
        district: "Pune".to_string(),
        state: "Maharashtra".to_string(),
        division: "Pune City East".to_string(),
        region: "Pune".to_string(),
        coordinates: coordinates.map(|(lat, lng)| LatLng::new(lat, lng)),
    }
}

#[derive(Default)]
pub struct MockPostalIndex {
    offices: HashMap<u32, Vec<PostOffice>>,
    /// Number of leading misses before a pincode starts answering
    flaky: HashMap<u32, usize>,
    calls: Arc<CallCounts>,
}

impl MockPostalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pincode: u32, offices: Vec<PostOffice>) -> Self {
        self.offices.insert(pincode, offices);
        self
    }

    pub fn flaky(mut self, pincode: u32, misses: usize) -> Self {
        self.flaky.insert(pincode, misses);
        self
    }

    pub fn calls(&self) -> Arc<CallCounts> {
        self.calls.clone()
    }
}

impl PostalIndex for MockPostalIndex {
    fn source(&self) -> &'static str {
        "mock"
    }

    async fn fetch_postal_index(&self, pincode: u32) -> Option<Vec<PostOffice>> {
        self.calls.postal.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut per = self.calls.per_pincode.lock().unwrap();
            let n = per.entry(pincode).or_insert(0);
            *n += 1;
            *n
        };
        if attempt <= self.flaky.get(&pincode).copied().unwrap_or(0) {
            return None;
        }
        self.offices.get(&pincode).cloned()
    }
}

#[derive(Default)]
pub struct MockGeocoder {
    places: HashMap<String, LatLng>,
    reverse: Option<ReverseAddress>,
    calls: Arc<CallCounts>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: &str, point: LatLng) -> Self {
        self.places.insert(name.to_lowercase(), point);
        self
    }

    pub fn with_reverse(mut self, address: ReverseAddress) -> Self {
        self.reverse = Some(address);
        self
    }

    pub fn calls(&self) -> Arc<CallCounts> {
        self.calls.clone()
    }
}

impl Geocoder for MockGeocoder {
    async fn geocode(&self, place_name: &str, _city_name: &str) -> Option<LatLng> {
        self.calls.geocode.fetch_add(1, Ordering::SeqCst);
        self.places.get(&place_name.to_lowercase()).copied()
    }

    async fn reverse(&self, _point: LatLng) -> Option<ReverseAddress> {
        self.calls.reverse.fetch_add(1, Ordering::SeqCst);
        self.reverse.clone()
    }
}
