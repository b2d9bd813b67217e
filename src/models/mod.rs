pub mod event;
pub mod plan;

pub use event::{CoachEvent, EventSink, StepView};
pub use plan::{PhaseDef, StepDef, WorkoutPlan};
