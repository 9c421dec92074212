//! Validation for the `[presence]` section.

use crate::schema::ConnectifyConfig;

use super::helpers::validate_range;

pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &ConnectifyConfig) {
    let presence = &config.presence;

    validate_range(
        errors,
        "presence.idle_timeout_secs",
        presence.idle_timeout_secs,
        5,
        3600,
    );

    if presence.channel.trim().is_empty() {
        errors.push("presence.channel must not be empty".into());
    }

    if presence.enabled && presence.activity_signals.is_empty() {
        errors.push("presence.activity_signals must list at least one signal".into());
    }
}
