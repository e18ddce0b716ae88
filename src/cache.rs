//! Thread-local planner state for the UI thread.
//!
//! The resource cache outlives component re-renders, so a route computed for
//! one search is served again when the user flips back to it. Keys follow
//! `"<operation>:<json args>"`:
//! - `route:[origin, destination, departureSecs, maxTransfers]`
//! - `arrivals:[origin, departureSecs, maxTransfers, maxDurationSecs]`
//! - `findStopById:[stopId]`

use crate::RouteSearch;
use transit_planner::config::{ARRIVALS_MAX_TRANSFERS, MAX_ISOCHRONE_DURATION_SECS, WORKER_SCRIPT};
use transit_planner::protocol::{Arrival, Route, SimpleStop, SourceStopId, Time};
use transit_planner::{PlannerClient, PlannerError, Resource, ResourceCache, ResourceKey};

thread_local! {
    /// Worker bridge shared by every component.
    static CLIENT: PlannerClient = PlannerClient::spawn(WORKER_SCRIPT);

    /// Global cache that survives component lifetimes.
    pub static RESOURCES: ResourceCache =
        ResourceCache::new(|task| wasm_bindgen_futures::spawn_local(task));
}

pub fn client() -> PlannerClient {
    CLIENT.with(PlannerClient::clone)
}

pub fn route_resource(search: &RouteSearch) -> Result<Resource<Option<Route>>, PlannerError> {
    let key = ResourceKey::new(
        "route",
        &(
            &search.origin,
            &search.destination,
            search.departure.to_seconds(),
            search.max_transfers,
        ),
    )?;
    let search = search.clone();
    Ok(RESOURCES.with(|cache| {
        cache.resource(key, move || {
            client().route(
                search.origin,
                search.destination,
                search.departure,
                search.max_transfers,
            )
        })
    }))
}

pub fn arrivals_resource(
    origin: &SourceStopId,
    departure: Time,
) -> Result<Resource<Vec<Arrival>>, PlannerError> {
    let key = ResourceKey::new(
        "arrivals",
        &(
            origin,
            departure.to_seconds(),
            ARRIVALS_MAX_TRANSFERS,
            MAX_ISOCHRONE_DURATION_SECS,
        ),
    )?;
    let origin = origin.clone();
    Ok(RESOURCES.with(|cache| {
        cache.resource(key, move || {
            client().arrivals(
                origin,
                departure,
                ARRIVALS_MAX_TRANSFERS,
                MAX_ISOCHRONE_DURATION_SECS,
            )
        })
    }))
}

pub fn stop_resource(stop_id: &SourceStopId) -> Result<Resource<Option<SimpleStop>>, PlannerError> {
    let key = ResourceKey::new("findStopById", &[stop_id])?;
    let stop_id = stop_id.clone();
    Ok(RESOURCES.with(|cache| cache.resource(key, move || client().find_stop_by_id(stop_id))))
}

pub fn resource_count() -> usize {
    RESOURCES.with(ResourceCache::len)
}
