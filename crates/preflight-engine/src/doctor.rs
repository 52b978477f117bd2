//! `doctor(config, target, {quick, verbose}) -> HealthReport` (§4.8).
//! Quick mode only runs schema validation, DAG build and policy checks;
//! full mode additionally probes every tool a compiled step or
//! provider declares it needs.

use std::collections::BTreeSet;
use std::time::Duration;

use preflight_types::{HealthReport, Result};

use crate::{validate_policy, EngineContext};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn doctor(engine: &EngineContext<'_>, quick: bool) -> Result<HealthReport> {
    let mut report = HealthReport::default();

    let compiled = match engine.compiled() {
        Ok(compiled) => compiled,
        Err(e) => {
            report.errors.push(e.to_string());
            return Ok(report);
        }
    };

    if let Err(e) = validate_policy(engine, &compiled.graph) {
        report.errors.push(e.to_string());
    }

    if quick {
        return Ok(report);
    }

    let mut tools: BTreeSet<String> = BTreeSet::new();
    for provider in engine.providers {
        tools.extend(provider.doctor_checks().into_iter().map(|c| c.tool));
    }
    for id in compiled.graph.order() {
        if let Some(step) = compiled.graph.get(id) {
            tools.extend(step.required_tools().iter().map(|t| t.to_string()));
        }
    }

    let run_ctx = engine.run_context();
    for tool in tools {
        match run_ctx
            .runner()
            .run(&tool, &[], None, Some(PROBE_TIMEOUT), run_ctx.cancel_token())
        {
            Ok(_) => {}
            Err(e) if e.kind() == preflight_types::ErrorKind::CommandNotFound => {
                report.missing_tools.push(tool);
            }
            Err(e) => report.errors.push(e.to_string()),
        }
    }

    Ok(report)
}
