//! Trigger and pipeline resolution.

use dockyard_core::{BuildSpec, Error, Event, PipelineSpec, Result, TriggerSpec};

/// First trigger whose event type and branch both equal the event's.
pub fn resolve_trigger<'a>(spec: &'a BuildSpec, event: &Event) -> Result<&'a TriggerSpec> {
    spec.triggers
        .iter()
        .find(|trigger| trigger.matches(event))
        .ok_or_else(|| Error::NoMatchingTrigger {
            event: event.event_type.to_string(),
            branch: event.branch.clone(),
        })
}

/// Pipeline named by the trigger.
pub fn resolve_pipeline<'a>(spec: &'a BuildSpec, trigger: &TriggerSpec) -> Result<&'a PipelineSpec> {
    spec.pipeline(&trigger.pipeline)
        .ok_or_else(|| Error::NoMatchingPipeline(trigger.pipeline.clone()))
}
