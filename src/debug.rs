use crate::{ControllerId, LightState, VehicleId};
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

#[allow(unused)]
pub fn debug_stop(vehicle: VehicleId, reason: &str) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "stop",
            "vehicle": format!("{:?}", vehicle),
            "reason": reason,
        }))
    })
}

#[allow(unused)]
pub fn debug_override(controller: ControllerId, state: LightState) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "override",
            "controller": format!("{:?}", controller),
            "state": format!("{:?}", state),
        }))
    })
}

#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
