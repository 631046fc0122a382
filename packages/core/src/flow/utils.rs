use std::sync::{Arc, Weak};

use flowboard_types::Value;

use super::execution::internal_pin::InternalPin;

pub async fn evaluate_pin_value_weak(
    pin: &Weak<InternalPin>,
) -> flowboard_types::Result<Value> {
    let pin = pin
        .upgrade()
        .ok_or_else(|| flowboard_types::anyhow!("Pin is not set"))?;
    evaluate_pin_value(pin).await
}

/// Resolve the value a pin currently carries: its own runtime value, the
/// value of the pin it depends on, or its default - in that order.
pub async fn evaluate_pin_value(pin: Arc<InternalPin>) -> flowboard_types::Result<Value> {
    let mut current_pin = pin;
    let mut visited_pins = std::collections::HashSet::with_capacity(8);

    loop {
        // Check for circular dependencies
        if !visited_pins.insert(current_pin.id.clone()) {
            return Err(flowboard_types::anyhow!(
                "Detected circular dependency in pin chain"
            ));
        }

        // Case 1: Pin has a runtime value
        if let Some(value) = current_pin.get_value().await {
            return Ok(value);
        }

        // Case 2: Pin depends on another pin
        if let Some(dependency) = current_pin.depends_on().first() {
            if let Some(dependency) = dependency.upgrade() {
                current_pin = dependency;
                continue;
            }
        }

        // Case 3: Use default value if available
        if let Some(default_value) = &current_pin.default_value {
            return Ok(default_value.clone());
        }

        // Case 4: No value found
        return Err(flowboard_types::anyhow!(
            "Pin '{}' has no value, dependencies, or default value",
            current_pin.name
        ));
    }
}
