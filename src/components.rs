//! Yew view components for the planner UI.
//!
//! Result components read through the resource cache and suspend while the
//! worker is busy; wrap them in `<Suspense>`.

use crate::hooks::{use_arrivals, use_route, use_stop, use_stop_search};
use crate::utils::{humanize_duration, isochrone_bands};
use crate::RouteSearch;
use transit_planner::protocol::{
    Leg, Route, RouteType, SimpleStop, SourceStopId, Time, Transfer, VehicleLeg,
};
use transit_planner::PlannerError;
use web_sys::HtmlInputElement;
use yew::prelude::*;
use yew::suspense::Suspense;

const REACHABILITY_BAND_SECS: u32 = 30 * 60;

fn route_type_label(route_type: RouteType) -> &'static str {
    match route_type {
        RouteType::Tram => "Tram",
        RouteType::Subway => "Metro",
        RouteType::Rail => "Train",
        RouteType::Bus | RouteType::Trolleybus => "Bus",
        RouteType::Ferry => "Boat",
        RouteType::CableTram | RouteType::Funicular => "Funicular",
        RouteType::AerialLift => "Cable car",
        RouteType::Monorail => "Monorail",
    }
}

/// Upper bound of a reachability band, e.g. "< 30 min".
fn band_label(start: u32) -> String {
    format!("< {}", humanize_duration(start + REACHABILITY_BAND_SECS, true))
}

fn render_error(err: &PlannerError) -> Html {
    html! {
        <div class="current-error compact">{ err.to_string() }</div>
    }
}

fn render_vehicle_leg(leg: &VehicleLeg) -> Html {
    let duration = leg.arrival_time.since(leg.departure_time).to_seconds();
    html! {
        <li class="leg vehicle-leg">
            <div class="leg-route">
                { format!("{} {}", route_type_label(leg.route.route_type), leg.route.name) }
            </div>
            <div class="leg-stops">
                { format!("{} {} → {} {}", leg.departure_time, leg.from.name,
                          leg.arrival_time, leg.to.name) }
            </div>
            <div class="leg-duration">{ humanize_duration(duration, true) }</div>
        </li>
    }
}

fn render_transfer(transfer: &Transfer) -> Html {
    let walk = transfer
        .min_transfer_time
        .map(|d| format!(" ({})", humanize_duration(d.to_seconds(), true)))
        .unwrap_or_default();
    html! {
        <li class="leg transfer-leg">
            { format!("Transfer from {} to {}{}", transfer.from.name, transfer.to.name, walk) }
        </li>
    }
}

/// Renders a route as a summary line followed by its legs.
pub fn render_route(route: &Route) -> Html {
    let summary = match (route.departure_time(), route.arrival_time()) {
        (Some(departure), Some(arrival)) => format!(
            "{} → {}, {}, {} transfer(s)",
            departure,
            arrival,
            humanize_duration(arrival.since(departure).to_seconds(), false),
            route.transfers()
        ),
        _ => "Walking only".to_string(),
    };

    html! {
        <div class="route">
            <div class="route-summary">{ summary }</div>
            <ol class="legs">
                { route.legs.iter().map(|leg| match leg {
                    Leg::Vehicle(vehicle) => render_vehicle_leg(vehicle),
                    Leg::Transfer(transfer) => render_transfer(transfer),
                }).collect::<Html>() }
            </ol>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct RouteResultsProps {
    pub search: RouteSearch,
}

#[function_component(RouteResults)]
pub fn route_results(props: &RouteResultsProps) -> HtmlResult {
    let route = use_route(&props.search)?;
    Ok(match route {
        Ok(Some(route)) => render_route(&route),
        Ok(None) => html! {
            <div class="no-results-message">
                <p>{ "No connection found for this search." }</p>
            </div>
        },
        Err(err) => render_error(&err),
    })
}

#[function_component(ResultsSkeleton)]
pub fn results_skeleton() -> Html {
    html! {
        <div class="results loading">
            <p>{ "Searching connections..." }</p>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct ReachabilityProps {
    pub origin: SourceStopId,
    pub departure: Time,
}

/// Stops reachable from the origin, counted per half hour of travel.
#[function_component(ReachabilitySummary)]
pub fn reachability_summary(props: &ReachabilityProps) -> HtmlResult {
    let arrivals = match use_arrivals(&props.origin, props.departure)? {
        Ok(arrivals) => arrivals,
        Err(err) => return Ok(render_error(&err)),
    };
    let bands = isochrone_bands(&arrivals, REACHABILITY_BAND_SECS);

    Ok(html! {
        <div class="reachability">
            <h3>{ format!("{} stops reachable", arrivals.len()) }</h3>
            <table class="reachability-table">
                <thead>
                    <tr>
                        <th>{ "Travel time" }</th>
                        <th>{ "Stops" }</th>
                    </tr>
                </thead>
                <tbody>
                    { bands.into_iter().map(|(start, count)| html! {
                        <tr>
                            <td>{ band_label(start) }</td>
                            <td>{ count }</td>
                        </tr>
                    }).collect::<Html>() }
                </tbody>
            </table>
        </div>
    })
}

#[derive(Properties, PartialEq)]
pub struct StopNameProps {
    pub stop_id: SourceStopId,
}

/// Display name of a stop, falling back to its id.
#[function_component(StopName)]
pub fn stop_name(props: &StopNameProps) -> HtmlResult {
    let name = match use_stop(&props.stop_id)? {
        Ok(Some(stop)) => stop.name,
        Ok(None) | Err(_) => props.stop_id.clone(),
    };
    Ok(html! { <span class="stop-name">{ name }</span> })
}

#[derive(Properties, PartialEq)]
pub struct StopSearchFieldProps {
    pub label: AttrValue,
    pub stop_id: SourceStopId,
    pub on_select: Callback<SourceStopId>,
}

/// Text field with a debounced stop lookup and a list of candidates.
#[function_component(StopSearchField)]
pub fn stop_search_field(props: &StopSearchFieldProps) -> Html {
    let text = use_state(String::new);
    let candidates = use_stop_search((*text).clone());

    let oninput = {
        let text = text.clone();
        Callback::from(move |e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            text.set(input.value());
        })
    };

    let render_candidate = |stop: &SimpleStop| {
        let onclick = {
            let on_select = props.on_select.clone();
            let text = text.clone();
            let source_id = stop.source_id.clone();
            Callback::from(move |_: MouseEvent| {
                on_select.emit(source_id.clone());
                text.set(String::new());
            })
        };
        html! {
            <li class="stop-candidate" {onclick}>{ stop.name.clone() }</li>
        }
    };

    let stop_fallback = html! { <span class="stop-name">{ props.stop_id.clone() }</span> };

    html! {
        <div class="form-group stop-search">
            <label>
                { format!("{}: ", props.label) }
                <Suspense fallback={stop_fallback}>
                    <StopName stop_id={props.stop_id.clone()} />
                </Suspense>
            </label>
            <input type="text"
                placeholder="Search a stop"
                value={(*text).clone()}
                {oninput}
            />
            if !text.is_empty() && !candidates.is_empty() {
                <ul class="stop-candidates">
                    { candidates.iter().map(render_candidate).collect::<Html>() }
                </ul>
            }
        </div>
    }
}
