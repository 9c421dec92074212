//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> &'static str {
    r##"# Connectify Presence Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[presence]
# enabled = true
# channel = "status"
# idle_timeout_secs = 60       # 5-3600
# activity_signals = ["pointer_move", "key_down"]   # also: "scroll", "touch"

[realtime]
# endpoint = "ws://localhost:4000/socket"
# heartbeat_interval = 30      # 5-300
# reconnect_delay = 1          # 1-60
# max_reconnect_delay = 30     # 1-600, not below reconnect_delay
# join_timeout = 10            # 1-120
# push_timeout = 10            # 1-120

[logging]
# level = "info"               # trace, debug, info, warn, error
"##
}
