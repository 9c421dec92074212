//! Validation for the `[realtime]` section.

use crate::schema::ConnectifyConfig;

use super::helpers::validate_range;

pub(crate) fn validate_realtime(errors: &mut Vec<String>, config: &ConnectifyConfig) {
    let rt = &config.realtime;

    let scheme_ok = ["ws://", "wss://", "http://", "https://"]
        .iter()
        .any(|s| rt.endpoint.starts_with(s));
    if !scheme_ok {
        errors.push(format!(
            "realtime.endpoint = {:?} must start with ws://, wss://, http:// or https://",
            rt.endpoint
        ));
    }

    validate_range(
        errors,
        "realtime.heartbeat_interval",
        rt.heartbeat_interval,
        5,
        300,
    );
    validate_range(errors, "realtime.reconnect_delay", rt.reconnect_delay, 1, 60);
    validate_range(
        errors,
        "realtime.max_reconnect_delay",
        rt.max_reconnect_delay,
        1,
        600,
    );
    validate_range(errors, "realtime.join_timeout", rt.join_timeout, 1, 120);
    validate_range(errors, "realtime.push_timeout", rt.push_timeout, 1, 120);

    if rt.max_reconnect_delay < rt.reconnect_delay {
        errors.push(format!(
            "realtime.max_reconnect_delay = {} is below realtime.reconnect_delay = {}",
            rt.max_reconnect_delay, rt.reconnect_delay
        ));
    }
}
