use transit_planner::codec::PlainValueCodec;
use transit_planner::worker_agent::PlannerTask;
use yew_agent::Registrable;

fn main() {
    // Set the panic hook to log detailed errors to the console
    console_error_panic_hook::set_once();
    PlannerTask::registrar()
        .encoding::<PlainValueCodec>()
        .register();
}
