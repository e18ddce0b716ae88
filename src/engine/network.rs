//! Bundled engine: a stops index plus connection-scan earliest-arrival search.
//!
//! Datasets are two bincode documents, [`TimetableData`] and [`StopsData`].
//! Connections are scanned once in departure order; trips are boarded only
//! from stops already reached and while the leg budget allows it.

use super::{Query, ReachingTime, RoutingResult, TransitEngine};
use crate::error::PlannerError;
use crate::protocol::Duration;
use crate::protocol::{
    Leg, Route, ServiceRoute, Stop, StopId, Time, Transfer, TransferType, VehicleLeg,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub source_stop_id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Parent station, if this stop is a platform of one.
    pub parent: Option<StopId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopsData {
    pub stops: Vec<StopRecord>,
}

/// One vehicle hop between consecutive stops of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: StopId,
    pub to: StopId,
    pub departure: u32,
    pub arrival: u32,
    pub trip: u32,
    /// Index into [`TimetableData::routes`].
    pub route: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from: StopId,
    pub to: StopId,
    pub min_transfer_time: Option<u32>,
    pub transfer_type: TransferType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimetableData {
    pub routes: Vec<ServiceRoute>,
    pub connections: Vec<Connection>,
    pub transfers: Vec<TransferRecord>,
}

struct Inner {
    stops: Vec<Stop>,
    parents: Vec<Option<StopId>>,
    children: HashMap<StopId, Vec<StopId>>,
    by_source_id: HashMap<String, StopId>,
    routes: Vec<ServiceRoute>,
    /// Sorted by departure.
    connections: Vec<Connection>,
    transfers: Vec<TransferRecord>,
    transfers_from: Vec<Vec<usize>>,
}

pub struct Network {
    inner: Rc<Inner>,
}

fn invalid(what: String) -> PlannerError {
    PlannerError::Decode(what)
}

impl Network {
    pub fn new(stops: StopsData, timetable: TimetableData) -> Result<Self, PlannerError> {
        let count = stops.stops.len();
        let known = |id: StopId| (id as usize) < count;

        let mut parents = Vec::with_capacity(count);
        let mut children: HashMap<StopId, Vec<StopId>> = HashMap::new();
        let mut by_source_id = HashMap::with_capacity(count);
        let mut index = Vec::with_capacity(count);
        for (id, record) in stops.stops.into_iter().enumerate() {
            let id = id as StopId;
            if let Some(parent) = record.parent {
                if !known(parent) {
                    return Err(invalid(format!("stop {id} has unknown parent {parent}")));
                }
                children.entry(parent).or_default().push(id);
            }
            parents.push(record.parent);
            by_source_id.insert(record.source_stop_id.clone(), id);
            index.push(Stop {
                id,
                source_stop_id: record.source_stop_id,
                name: record.name,
                lat: record.lat,
                lon: record.lon,
            });
        }

        let TimetableData {
            routes,
            mut connections,
            transfers,
        } = timetable;
        for (i, c) in connections.iter().enumerate() {
            if !known(c.from) || !known(c.to) {
                return Err(invalid(format!("connection {i} references an unknown stop")));
            }
            if c.route as usize >= routes.len() {
                return Err(invalid(format!("connection {i} references unknown route {}", c.route)));
            }
            if c.arrival < c.departure {
                return Err(invalid(format!("connection {i} arrives before it departs")));
            }
        }
        connections.sort_by_key(|c| (c.departure, c.arrival));

        let mut transfers_from = vec![Vec::new(); count];
        for (i, t) in transfers.iter().enumerate() {
            if !known(t.from) || !known(t.to) {
                return Err(invalid(format!("transfer {i} references an unknown stop")));
            }
            transfers_from[t.from as usize].push(i);
        }

        Ok(Network {
            inner: Rc::new(Inner {
                stops: index,
                parents,
                children,
                by_source_id,
                routes,
                connections,
                transfers,
                transfers_from,
            }),
        })
    }

    /// Build from the raw (already decompressed) dataset bytes.
    pub fn decode(timetable: &[u8], stops: &[u8]) -> Result<Self, PlannerError> {
        let stops: StopsData = bincode::deserialize(stops)?;
        let timetable: TimetableData = bincode::deserialize(timetable)?;
        Network::new(stops, timetable)
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stops.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum Hop {
    Ride { enter: usize, exit: usize },
    Walk { transfer: usize },
}

#[derive(Debug, Clone, Copy)]
struct Label {
    time: u32,
    legs: u8,
    hop: Option<Hop>,
}

impl Inner {
    /// The stop itself plus its platforms when it is a parent station.
    fn equivalents(&self, source_id: &str) -> Result<Vec<StopId>, PlannerError> {
        let id = *self
            .by_source_id
            .get(source_id)
            .ok_or_else(|| PlannerError::UnknownStop(source_id.to_string()))?;
        let mut ids = vec![id];
        if let Some(children) = self.children.get(&id) {
            ids.extend_from_slice(children);
        }
        Ok(ids)
    }

    fn relax_transfers(&self, labels: &mut [Option<Label>], stop: StopId) {
        let Some(reached) = labels[stop as usize] else {
            return;
        };
        for &t in &self.transfers_from[stop as usize] {
            let transfer = &self.transfers[t];
            let time = reached.time + transfer.min_transfer_time.unwrap_or(0);
            let slot = &mut labels[transfer.to as usize];
            if slot.map_or(true, |l| time < l.time) {
                *slot = Some(Label {
                    time,
                    legs: reached.legs,
                    hop: Some(Hop::Walk { transfer: t }),
                });
            }
        }
    }

    fn scan(&self, query: &Query) -> Result<Vec<Option<Label>>, PlannerError> {
        let origins = self.equivalents(&query.origin)?;
        let mut targets = Vec::new();
        for destination in &query.destinations {
            targets.extend(self.equivalents(destination)?);
        }

        let departure = query.departure_time.to_seconds();
        let max_legs = query.max_transfers.saturating_add(1);
        let mut labels: Vec<Option<Label>> = vec![None; self.stops.len()];
        for &origin in &origins {
            labels[origin as usize] = Some(Label {
                time: departure,
                legs: 0,
                hop: None,
            });
        }
        for &origin in &origins {
            self.relax_transfers(&mut labels, origin);
        }

        // trip -> (boarding connection, leg number on that trip)
        let mut boarded: HashMap<u32, (usize, u8)> = HashMap::new();
        let start = self.connections.partition_point(|c| c.departure < departure);
        for (index, c) in self.connections.iter().enumerate().skip(start) {
            if !targets.is_empty()
                && targets
                    .iter()
                    .all(|&t| labels[t as usize].is_some_and(|l| l.time <= c.departure))
            {
                break;
            }

            let on_board = match boarded.get(&c.trip) {
                Some(&state) => Some(state),
                None => match labels[c.from as usize] {
                    Some(label) if label.time <= c.departure && label.legs < max_legs => {
                        let state = (index, label.legs + 1);
                        boarded.insert(c.trip, state);
                        Some(state)
                    }
                    _ => None,
                },
            };
            let Some((enter, legs)) = on_board else {
                continue;
            };

            let slot = &mut labels[c.to as usize];
            if slot.map_or(true, |l| c.arrival < l.time) {
                *slot = Some(Label {
                    time: c.arrival,
                    legs,
                    hop: Some(Hop::Ride { enter, exit: index }),
                });
                self.relax_transfers(&mut labels, c.to);
            }
        }
        Ok(labels)
    }

    fn is_child(&self, id: StopId) -> bool {
        self.parents[id as usize].is_some()
    }
}

struct NetworkResult {
    inner: Rc<Inner>,
    labels: Vec<Option<Label>>,
}

impl RoutingResult for NetworkResult {
    fn earliest_arrivals(&self) -> Vec<(StopId, ReachingTime)> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(id, label)| {
                label.map(|l| {
                    (
                        id as StopId,
                        ReachingTime {
                            time: Time::from_seconds(l.time),
                            leg_number: l.legs,
                        },
                    )
                })
            })
            .collect()
    }

    fn best_route(&self, destination: &str) -> Option<Route> {
        let inner = &self.inner;
        let mut stop = inner
            .equivalents(destination)
            .ok()?
            .into_iter()
            .filter(|&id| self.labels[id as usize].is_some())
            .min_by_key(|&id| self.labels[id as usize].map(|l| l.time))?;

        let mut legs = Vec::new();
        while let Some(hop) = self.labels[stop as usize].and_then(|l| l.hop) {
            if legs.len() > self.labels.len() {
                log::error!("Journey pointers loop at stop {}", stop);
                return None;
            }
            match hop {
                Hop::Ride { enter, exit } => {
                    let (first, last) = (&inner.connections[enter], &inner.connections[exit]);
                    legs.push(Leg::Vehicle(VehicleLeg {
                        from: inner.stops[first.from as usize].clone(),
                        to: inner.stops[last.to as usize].clone(),
                        route: inner.routes[first.route as usize].clone(),
                        departure_time: Time::from_seconds(first.departure),
                        arrival_time: Time::from_seconds(last.arrival),
                    }));
                    stop = first.from;
                }
                Hop::Walk { transfer } => {
                    let t = &inner.transfers[transfer];
                    legs.push(Leg::Transfer(Transfer {
                        from: inner.stops[t.from as usize].clone(),
                        to: inner.stops[t.to as usize].clone(),
                        min_transfer_time: t.min_transfer_time.map(Duration::from_seconds),
                        transfer_type: t.transfer_type,
                    }));
                    stop = t.from;
                }
            }
        }
        legs.reverse();
        Some(Route { legs })
    }
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

impl TransitEngine for Network {
    fn route(&self, query: &Query) -> Result<Rc<dyn RoutingResult>, PlannerError> {
        let labels = self.inner.scan(query)?;
        Ok(Rc::new(NetworkResult {
            inner: Rc::clone(&self.inner),
            labels,
        }))
    }

    fn find_stop_by_id(&self, id: StopId) -> Option<Stop> {
        self.inner.stops.get(id as usize).cloned()
    }

    fn find_stop_by_source_id(&self, id: &str) -> Option<Stop> {
        let id = *self.inner.by_source_id.get(id)?;
        self.find_stop_by_id(id)
    }

    fn find_stops_by_name(&self, query: &str, max_results: usize) -> Vec<Stop> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(u8, &Stop)> = self
            .inner
            .stops
            .iter()
            .filter(|s| !self.inner.is_child(s.id))
            .filter_map(|s| {
                let name = s.name.to_lowercase();
                let score = if name.starts_with(&needle) {
                    0
                } else if name
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word.starts_with(&needle))
                {
                    1
                } else if name.contains(&needle) {
                    2
                } else {
                    return None;
                };
                Some((score, s))
            })
            .collect();
        scored.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.name.len().cmp(&b.1.name.len()))
                .then_with(|| a.1.name.cmp(&b.1.name))
        });
        scored
            .into_iter()
            .take(max_results)
            .map(|(_, s)| s.clone())
            .collect()
    }

    fn find_stops_by_location(
        &self,
        lat: f64,
        lon: f64,
        max_results: usize,
        radius_km: f64,
    ) -> Vec<Stop> {
        let mut nearby: Vec<(f64, &Stop)> = self
            .inner
            .stops
            .iter()
            .filter(|s| !self.inner.is_child(s.id))
            .filter_map(|s| {
                let distance = haversine_km(lat, lon, s.lat?, s.lon?);
                (distance <= radius_km).then_some((distance, s))
            })
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
        nearby
            .into_iter()
            .take(max_results)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::RouteType;

    fn record(
        source: &str,
        name: &str,
        coords: Option<(f64, f64)>,
        parent: Option<StopId>,
    ) -> StopRecord {
        StopRecord {
            source_stop_id: source.into(),
            name: name.into(),
            lat: coords.map(|c| c.0),
            lon: coords.map(|c| c.1),
            parent,
        }
    }

    fn hm(h: u32, m: u32) -> u32 {
        h * 3600 + m * 60
    }

    /// Lausanne (station PA with platform A1) -> Renens -> Morges -> Geneva.
    pub(crate) fn sample_data() -> (StopsData, TimetableData) {
        let stops = StopsData {
            stops: vec![
                record("PA", "Lausanne", Some((46.5167, 6.6291)), None),
                record("A1", "Lausanne", Some((46.5167, 6.6291)), Some(0)),
                record("B", "Renens VD", Some((46.5376, 6.5786)), None),
                record("C", "Morges", Some((46.5107, 6.4984)), None),
                record("D", "Genève", Some((46.2102, 6.1424)), None),
                record("E", "Renens VD, gare sud", Some((46.5370, 6.5790)), None),
                record("X", "Nowhere", None, None),
            ],
        };
        let conn = |from, to, dep, arr, trip, route| Connection {
            from,
            to,
            departure: dep,
            arrival: arr,
            trip,
            route,
        };
        let timetable = TimetableData {
            routes: vec![
                ServiceRoute {
                    route_type: RouteType::Rail,
                    name: "S1".into(),
                },
                ServiceRoute {
                    route_type: RouteType::Rail,
                    name: "IR15".into(),
                },
            ],
            connections: vec![
                conn(2, 3, hm(8, 6), hm(8, 15), 1, 0),
                conn(1, 2, hm(8, 0), hm(8, 5), 1, 0),
                conn(3, 4, hm(8, 20), hm(8, 50), 2, 1),
                conn(1, 3, hm(8, 10), hm(8, 30), 3, 0),
            ],
            transfers: vec![TransferRecord {
                from: 2,
                to: 5,
                min_transfer_time: Some(120),
                transfer_type: TransferType::RequiresMinimalTime,
            }],
        };
        (stops, timetable)
    }

    pub(crate) fn sample_network() -> Network {
        let (stops, timetable) = sample_data();
        Network::new(stops, timetable).unwrap()
    }

    #[test]
    fn best_route_changes_trains_once() {
        let network = sample_network();
        let query = Query::from("PA", Time::from_seconds(hm(7, 55)), 1).to("D");
        let result = network.route(&query).unwrap();
        let route = result.best_route("D").unwrap();

        assert_eq!(route.legs.len(), 2);
        assert_eq!(route.transfers(), 1);
        assert_eq!(route.departure_time(), Some(Time::from_seconds(hm(8, 0))));
        assert_eq!(route.arrival_time(), Some(Time::from_seconds(hm(8, 50))));
        match &route.legs[0] {
            Leg::Vehicle(leg) => {
                assert_eq!(leg.from.source_stop_id, "A1");
                assert_eq!(leg.to.source_stop_id, "C");
                assert_eq!(leg.route.name, "S1");
            }
            other => panic!("expected a vehicle leg, got {other:?}"),
        }
    }

    #[test]
    fn transfer_bound_limits_reach() {
        let network = sample_network();
        let query = Query::from("PA", Time::from_seconds(hm(7, 55)), 0).to("D");
        let result = network.route(&query).unwrap();
        assert!(result.best_route("D").is_none());
        assert!(result.best_route("C").is_some());
    }

    #[test]
    fn arrivals_include_walking_transfers() {
        let network = sample_network();
        let query = Query::from("PA", Time::from_seconds(hm(7, 55)), 4);
        let arrivals: HashMap<StopId, ReachingTime> = network
            .route(&query)
            .unwrap()
            .earliest_arrivals()
            .into_iter()
            .collect();

        assert_eq!(arrivals[&5].time, Time::from_seconds(hm(8, 7)));
        assert_eq!(arrivals[&5].leg_number, 1);
        assert_eq!(arrivals[&4].leg_number, 2);
        assert_eq!(arrivals[&0].leg_number, 0);
        assert!(!arrivals.contains_key(&6));

        let route = network.route(&query).unwrap().best_route("E").unwrap();
        assert!(matches!(route.legs.last(), Some(Leg::Transfer(_))));
    }

    #[test]
    fn unknown_origin_is_an_error() {
        let network = sample_network();
        let query = Query::from("nope", Time::from_seconds(0), 2);
        assert_eq!(
            network.route(&query).err(),
            Some(PlannerError::UnknownStop("nope".into()))
        );
    }

    #[test]
    fn name_search_prefers_prefixes_and_skips_platforms() {
        let network = sample_network();
        let names: Vec<String> = network
            .find_stops_by_name("ren", 5)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Renens VD", "Renens VD, gare sud"]);

        let lausanne = network.find_stops_by_name("lausanne", 5);
        assert_eq!(lausanne.len(), 1);
        assert_eq!(lausanne[0].source_stop_id, "PA");

        assert!(network.find_stops_by_name("  ", 5).is_empty());
        assert_eq!(network.find_stops_by_name("e", 1).len(), 1);
    }

    #[test]
    fn location_search_is_radius_bounded() {
        let network = sample_network();
        let near: Vec<String> = network
            .find_stops_by_location(46.5374, 6.5788, 5, 1.0)
            .into_iter()
            .map(|s| s.source_stop_id)
            .collect();
        assert_eq!(near.len(), 2);
        assert!(near.contains(&"B".to_string()));
        assert!(near.contains(&"E".to_string()));
    }

    #[test]
    fn decode_checks_references() {
        let (stops, timetable) = sample_data();
        let stops_bytes = bincode::serialize(&stops).unwrap();
        let timetable_bytes = bincode::serialize(&timetable).unwrap();
        let network = Network::decode(&timetable_bytes, &stops_bytes).unwrap();
        assert_eq!(network.stop_count(), 7);

        assert!(matches!(
            Network::decode(&[1, 2, 3], &stops_bytes),
            Err(PlannerError::Decode(_))
        ));

        let (stops, mut timetable) = sample_data();
        timetable.connections[0].to = 99;
        assert!(matches!(
            Network::new(stops, timetable),
            Err(PlannerError::Decode(_))
        ));
    }
}
