//! Configuration validation
//!
//! Rules:
//! - field ranges declared on the blueprint sections (`validator` derive)
//! - expected multiples strictly positive
//! - six target gates, `low < high`, pairwise disjoint
//! - at least one channel, channel ids unique
//! - sink names unique and non-empty, file sinks carry a usable `base_path`

use std::collections::HashSet;

use contracts::{ContractError, RunBlueprint, SinkType, TARGET_SLOTS};
use validator::{Validate, ValidationErrors};

/// Validate a RunBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    validate_ranges(blueprint)?;
    validate_multiples(blueprint)?;
    validate_target_gates(blueprint)?;
    validate_channels(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// Derived range checks, reported with the section prefix
fn validate_ranges(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    blueprint
        .input
        .validate()
        .map_err(|e| range_error("input", e))?;
    blueprint
        .sync
        .validate()
        .map_err(|e| range_error("sync", e))?;
    for channel in &blueprint.channels {
        channel
            .validate()
            .map_err(|e| range_error(&format!("channels[id={}]", channel.id), e))?;
    }
    Ok(())
}

fn range_error(section: &str, errors: ValidationErrors) -> ContractError {
    let field = errors
        .field_errors()
        .keys()
        .next()
        .map(|name| format!("{section}.{name}"))
        .unwrap_or_else(|| section.to_string());
    ContractError::config_validation(field, errors.to_string())
}

fn validate_multiples(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    if blueprint.sync.expected_multiples.contains(&0) {
        return Err(ContractError::config_validation(
            "sync.expected_multiples",
            "multiples must be strictly positive",
        ));
    }
    Ok(())
}

/// An empty list falls back to the built-in table
fn validate_target_gates(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let gates = &blueprint.clock.target_gates;
    if gates.is_empty() {
        return Ok(());
    }

    if gates.len() != TARGET_SLOTS {
        return Err(ContractError::config_validation(
            "clock.target_gates",
            format!("expected {TARGET_SLOTS} gates, got {}", gates.len()),
        ));
    }

    for (idx, gate) in gates.iter().enumerate() {
        if gate.low >= gate.high {
            return Err(ContractError::config_validation(
                format!("clock.target_gates[{idx}]"),
                format!("low ({}) must be < high ({})", gate.low, gate.high),
            ));
        }
    }

    for (i, a) in gates.iter().enumerate() {
        for (j, b) in gates.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                return Err(ContractError::config_validation(
                    format!("clock.target_gates[{i}]"),
                    format!("gate overlaps target_gates[{j}]"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_channels(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    if blueprint.channels.is_empty() {
        return Err(ContractError::config_validation(
            "channels",
            "at least one detector channel is required",
        ));
    }

    let mut seen = HashSet::new();
    for channel in &blueprint.channels {
        if !seen.insert(channel.id) {
            return Err(ContractError::config_validation(
                format!("channels[id={}]", channel.id),
                "duplicate channel id",
            ));
        }
    }
    Ok(())
}

fn validate_sinks(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::File {
            if let Some(base) = sink.params.get("base_path") {
                if base.trim().is_empty() {
                    return Err(ContractError::config_validation(
                        format!("sinks[{}].params.base_path", sink.name),
                        "base_path cannot be empty",
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ChannelConfig, ChannelId, ClockSection, ConfigVersion, InputConfig, SinkConfig,
        SyncSection, TargetGate,
    };

    fn minimal_blueprint() -> RunBlueprint {
        RunBlueprint {
            version: ConfigVersion::V1,
            input: InputConfig::default(),
            clock: ClockSection::default(),
            sync: SyncSection::default(),
            channels: vec![ChannelConfig {
                id: ChannelId::new(2),
                name: "summed".into(),
                offset_ns: 775.35,
                period_limit_ns: 625_000.0,
                use_fine_time: true,
            }],
            sinks: vec![SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 100,
                params: Default::default(),
            }],
        }
    }

    fn expect_err(bp: &RunBlueprint, needle: &str) {
        let result = validate(bp);
        assert!(result.is_err(), "expected failure containing '{needle}'");
        let err = result.unwrap_err().to_string();
        assert!(err.contains(needle), "got: {err}");
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_duplicate_channel_id() {
        let mut bp = minimal_blueprint();
        bp.channels.push(bp.channels[0].clone());
        expect_err(&bp, "duplicate channel id");
    }

    #[test]
    fn test_no_channels() {
        let mut bp = minimal_blueprint();
        bp.channels.clear();
        expect_err(&bp, "at least one");
    }

    #[test]
    fn test_non_positive_period_limit() {
        let mut bp = minimal_blueprint();
        bp.channels[0].period_limit_ns = 0.0;
        expect_err(&bp, "period_limit_ns");
    }

    #[test]
    fn test_tolerance_range() {
        let mut bp = minimal_blueprint();
        bp.sync.period_tolerance = 0.5;
        expect_err(&bp, "period_tolerance");

        bp.sync.period_tolerance = 0.0;
        expect_err(&bp, "period_tolerance");
    }

    #[test]
    fn test_sample_period_positive() {
        let mut bp = minimal_blueprint();
        bp.input.sample_period_ns = -2.0;
        expect_err(&bp, "sample_period_ns");
    }

    #[test]
    fn test_multiples() {
        let mut bp = minimal_blueprint();
        bp.sync.expected_multiples = vec![];
        expect_err(&bp, "expected_multiples");

        bp.sync.expected_multiples = vec![1, 0];
        expect_err(&bp, "strictly positive");
    }

    #[test]
    fn test_gate_count() {
        let mut bp = minimal_blueprint();
        bp.clock.target_gates = vec![TargetGate::new(0, 10)];
        expect_err(&bp, "expected 6 gates");
    }

    #[test]
    fn test_gate_bounds_and_overlap() {
        let mut bp = minimal_blueprint();
        let mut gates: Vec<TargetGate> = (0..6).map(|i| TargetGate::new(i * 100, i * 100 + 50)).collect();
        bp.clock.target_gates = gates.clone();
        assert!(validate(&bp).is_ok());

        gates[2] = TargetGate::new(250, 250);
        bp.clock.target_gates = gates.clone();
        expect_err(&bp, "must be < high");

        gates[2] = TargetGate::new(40, 120);
        bp.clock.target_gates = gates;
        expect_err(&bp, "overlaps");
    }

    #[test]
    fn test_sink_rules() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].name = String::new();
        expect_err(&bp, "cannot be empty");

        let mut bp = minimal_blueprint();
        bp.sinks.push(bp.sinks[0].clone());
        expect_err(&bp, "duplicate sink name");

        let mut bp = minimal_blueprint();
        bp.sinks.push(SinkConfig {
            name: "files".into(),
            sink_type: SinkType::File,
            queue_capacity: 16,
            params: [("base_path".to_string(), " ".to_string())].into_iter().collect(),
        });
        expect_err(&bp, "base_path cannot be empty");
    }
}
