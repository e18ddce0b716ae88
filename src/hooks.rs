use crate::cache;
use crate::utils::is_current_query;
use crate::RouteSearch;
use gloo_timers::callback::Timeout;
use log::{debug, warn};
use std::rc::Rc;
use transit_planner::config::{DEBOUNCE_MS, STOP_SEARCH_MAX_RESULTS};
use transit_planner::protocol::{Arrival, Route, SimpleStop, SourceStopId, Time};
use transit_planner::{PlannerError, ReadError, Resource};
use web_sys::HtmlInputElement;
use yew::prelude::*;
use yew::suspense::{Suspension, SuspensionResult};

/// Holds the state and callbacks for a validated input field.
#[derive(Clone)]
pub struct ValidatedInput<T: Clone + PartialEq + 'static> {
    /// The current text content of the input field.
    pub text: String,
    /// The last value that passed validation.
    pub value: T,
    /// An optional error message if validation failed.
    pub error: Option<String>,
    /// Callback for the text input's `oninput` event.
    pub on_text_input: Callback<InputEvent>,
    /// Parse and validate the current text, typically from `onchange`.
    pub on_commit: Callback<()>,
}

/// Custom hook to manage state for a validated input field.
#[hook]
pub fn use_validated_input<T>(
    initial_value: T,
    parse_and_validate: Rc<dyn Fn(&str) -> Result<T, String>>,
) -> ValidatedInput<T>
where
    T: Clone + PartialEq + std::fmt::Display + 'static,
{
    let value_handle: UseStateHandle<T> = use_state(|| initial_value.clone());
    let text_handle: UseStateHandle<String> = use_state(|| initial_value.to_string());
    let error_handle: UseStateHandle<Option<String>> = use_state(|| None::<String>);

    let on_text_input = {
        let text_setter = text_handle.clone();
        Callback::from(move |e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            text_setter.set(input.value());
        })
    };

    let on_commit = {
        let text_handle = text_handle.clone();
        let value_setter = value_handle.clone();
        let error_setter = error_handle.clone();
        Callback::from(move |_| match parse_and_validate(&text_handle) {
            Ok(parsed) => {
                // Show the canonical form, e.g. "8h30" becomes "08:30".
                text_handle.set(parsed.to_string());
                value_setter.set(parsed);
                error_setter.set(None);
            }
            Err(message) => error_setter.set(Some(message)),
        })
    };

    ValidatedInput {
        text: (*text_handle).clone(),
        value: (*value_handle).clone(),
        error: (*error_handle).clone(),
        on_text_input,
        on_commit,
    }
}

/// Read a resource for a suspending component.
///
/// Pending entries suspend the component until they settle. Failures are
/// handed to the component so it can render them next to the form.
fn suspend_on<T: Clone>(
    resource: Result<Resource<T>, PlannerError>,
) -> SuspensionResult<Result<T, PlannerError>> {
    let resource = match resource {
        Ok(resource) => resource,
        Err(err) => return Ok(Err(err)),
    };
    match resource.read() {
        Ok(value) => Ok(Ok(value)),
        Err(ReadError::Failed(err)) => Ok(Err(err)),
        Err(ReadError::Suspended(suspender)) => Err(Suspension::from_future(suspender)),
    }
}

#[hook]
pub fn use_route(search: &RouteSearch) -> SuspensionResult<Result<Option<Route>, PlannerError>> {
    suspend_on(cache::route_resource(search))
}

#[hook]
pub fn use_arrivals(
    origin: &SourceStopId,
    departure: Time,
) -> SuspensionResult<Result<Vec<Arrival>, PlannerError>> {
    suspend_on(cache::arrivals_resource(origin, departure))
}

#[hook]
pub fn use_stop(
    stop_id: &SourceStopId,
) -> SuspensionResult<Result<Option<SimpleStop>, PlannerError>> {
    suspend_on(cache::stop_resource(stop_id))
}

/// Debounced stop name search.
///
/// Each keystroke restarts the timer. Replies that arrive after the query
/// text has moved on are dropped, so results never flash back to an older
/// search.
#[hook]
pub fn use_stop_search(query: String) -> Rc<Vec<SimpleStop>> {
    let results = use_state(|| Rc::new(Vec::<SimpleStop>::new()));
    let latest_query = use_mut_ref(String::new);
    let debounce_timer = use_mut_ref(|| None::<Timeout>);

    {
        let results = results.clone();
        use_effect_with(query, move |query| {
            *latest_query.borrow_mut() = query.clone();
            let query = query.trim().to_string();

            if query.is_empty() {
                debounce_timer.borrow_mut().take();
                results.set(Rc::new(Vec::new()));
                return;
            }

            // Replacing the handle cancels the previous timer
            *debounce_timer.borrow_mut() = Some(Timeout::new(DEBOUNCE_MS, move || {
                let reply = cache::client()
                    .find_stops_by_name(query.clone(), Some(STOP_SEARCH_MAX_RESULTS));
                wasm_bindgen_futures::spawn_local(async move {
                    let stops = reply.await;
                    if !is_current_query(&latest_query.borrow(), &query) {
                        debug!("Discarding stale stop search for {:?}", query);
                        return;
                    }
                    match stops {
                        Ok(stops) => results.set(Rc::new(stops)),
                        Err(err) => warn!("Stop search for {:?} failed: {}", query, err),
                    }
                });
            }));
        });
    }

    (*results).clone()
}
