use crate::domain::MovementLimits;
use crate::domain::movement::{MAX_TILE_DISTANCE_PER_REQUEST, WORLD_MAX};
use crate::use_cases::QueueConfig;
use crate::use_cases::action_queue::{MAX_ACTION_AGE, MAX_INTERACTION_QUEUE};
use std::{env, str::FromStr, time::Duration};

// Runtime/server settings. Gameplay limits default to the domain constants.

pub const INPUT_CHANNEL_CAPACITY: usize = 1024;

const DEFAULT_TICK_INTERVAL_MS: u64 = 600;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn http_port() -> u16 {
    env_or("ACTION_SERVER_PORT", 3101)
}

pub fn tick_interval() -> Duration {
    // A zero interval would make tokio::time::interval panic.
    let millis = env_or("TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL_MS).max(1);
    Duration::from_millis(millis)
}

pub fn queue_config() -> QueueConfig {
    QueueConfig {
        max_interaction_queue: env_or("MAX_INTERACTION_QUEUE", MAX_INTERACTION_QUEUE),
        max_action_age: Duration::from_millis(env_or(
            "MAX_ACTION_AGE_MS",
            MAX_ACTION_AGE.as_millis() as u64,
        )),
    }
}

pub fn movement_limits() -> MovementLimits {
    // The world is symmetric around the origin on both axes.
    let bound = env_or("WORLD_BOUND", WORLD_MAX).saturating_abs();
    MovementLimits {
        world_min: -bound,
        world_max: bound,
        max_tile_distance: env_or("MAX_TILE_DISTANCE", MAX_TILE_DISTANCE_PER_REQUEST).max(0),
    }
}
