//! Main module for the transit planner application using Yew.
//! Wires the search form, suspending result views and cache controls.

use log::{info, warn};
use std::rc::Rc;
use transit_planner::config::*;
use transit_planner::protocol::{SourceStopId, Time};
use yew::prelude::*;
use yew::suspense::Suspense;

mod cache;
mod components;
mod hooks;
mod utils;

use components::{ReachabilitySummary, ResultsSkeleton, RouteResults, StopSearchField};
use hooks::use_validated_input;
use utils::{parse_time_of_day, validate_max_transfers};

/// Everything a route search depends on. Two equal searches share one
/// cached result.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSearch {
    pub origin: SourceStopId,
    pub destination: SourceStopId,
    pub departure: Time,
    pub max_transfers: u8,
}

/// Helper to bump the cache version and trigger a UI re-render
fn update_cache_version(cache_version: &UseStateHandle<usize>) {
    cache_version.set(cache_version.wrapping_add(1));
}

/// Primary application component wiring state and UI elements.
#[function_component(Main)]
fn main_component() -> Html {
    let origin = use_state(|| SourceStopId::from(DEFAULT_ORIGIN));
    let destination = use_state(|| SourceStopId::from(DEFAULT_DESTINATION));
    let parse_departure: Rc<dyn Fn(&str) -> Result<Time, String>> = Rc::new(parse_time_of_day);
    let parse_transfers: Rc<dyn Fn(&str) -> Result<u8, String>> = Rc::new(validate_max_transfers);
    let departure =
        use_validated_input(Time::from_seconds(DEFAULT_DEPARTURE_SECS), parse_departure);
    let transfers = use_validated_input(DEFAULT_MAX_TRANSFERS, parse_transfers);
    // Cache version state triggers UI re-render when the global cache changes
    let cache_version = use_state(|| 0usize);

    let search = RouteSearch {
        origin: (*origin).clone(),
        destination: (*destination).clone(),
        departure: departure.value,
        max_transfers: transfers.value,
    };

    let select_origin = {
        let origin = origin.clone();
        Callback::from(move |stop_id: SourceStopId| origin.set(stop_id))
    };
    let select_destination = {
        let destination = destination.clone();
        Callback::from(move |stop_id: SourceStopId| destination.set(stop_id))
    };
    let swap_stops = {
        let origin = origin.clone();
        let destination = destination.clone();
        Callback::from(move |_: MouseEvent| {
            let previous_origin = (*origin).clone();
            origin.set((*destination).clone());
            destination.set(previous_origin);
        })
    };

    let clear_cache = {
        let cache_version = cache_version.clone();
        Callback::from(move |_: MouseEvent| {
            cache::RESOURCES.with(|c| c.clear());
            let release = cache::client().release_memory();
            wasm_bindgen_futures::spawn_local(async move {
                match release.await {
                    Ok(evicted) => info!("Worker released {} cached queries", evicted),
                    Err(err) => warn!("Worker could not release memory: {}", err),
                }
            });
            update_cache_version(&cache_version);
        })
    };

    html! {
        <div class="container">
            <h1>{ "Transit Planner" }</h1>

            <div class="form-container">
                <div class="form-row">
                    <StopSearchField
                        label="From"
                        stop_id={search.origin.clone()}
                        on_select={select_origin}
                    />
                    <button class="btn-secondary small" onclick={swap_stops}>{ "⇅" }</button>
                    <StopSearchField
                        label="To"
                        stop_id={search.destination.clone()}
                        on_select={select_destination}
                    />
                </div>

                <div class="form-row">
                    <div class="form-group">
                        <label for="departure_input">{ "Departure:" }</label>
                        <input
                            type="text"
                            id="departure_input"
                            value={departure.text.clone()}
                            class={if departure.error.is_some() { "invalid" } else { "" }}
                            placeholder="08:30"
                            oninput={departure.on_text_input.clone()}
                            onchange={departure.on_commit.reform(|_| ())}
                        />
                        if let Some(ref err) = departure.error {
                            <div class="input-error">{ err }</div>
                        }
                    </div>

                    <div class="form-group">
                        <label for="transfers_input">{ "Max transfers:" }</label>
                        <input
                            type="number"
                            id="transfers_input"
                            min={MIN_TRANSFERS.to_string()}
                            max={MAX_TRANSFERS.to_string()}
                            value={transfers.text.clone()}
                            class={if transfers.error.is_some() { "invalid" } else { "" }}
                            oninput={transfers.on_text_input.clone()}
                            onchange={transfers.on_commit.reform(|_| ())}
                        />
                        if let Some(ref err) = transfers.error {
                            <div class="input-error">{ err }</div>
                        }
                    </div>
                </div>

                <div class="cache-stats">
                    <div class="cache-status-global compact">
                        { format!("Cached resources: {}", cache::resource_count()) }
                    </div>
                    <button class="btn-secondary small" onclick={clear_cache}>
                        { "Clear Cache" }
                    </button>
                </div>
            </div>

            // Results section; remounted after a cache clear
            <div class="results-area" key={*cache_version}>
                <Suspense fallback={html! { <ResultsSkeleton /> }}>
                    <RouteResults search={search.clone()} />
                </Suspense>
                <Suspense fallback={html! { <ResultsSkeleton /> }}>
                    <ReachabilitySummary
                        origin={search.origin.clone()}
                        departure={search.departure}
                    />
                </Suspense>
            </div>
        </div>
    }
}

#[function_component]
pub fn App() -> Html {
    html! { <Main /> }
}

/// Entry point: initializes the Yew renderer for the App component.
fn main() {
    console_error_panic_hook::set_once();
    yew::Renderer::<App>::new().render();
}
