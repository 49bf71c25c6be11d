//! Runs a declarative test scenario against a fresh pipeline: apply the
//! config override, perform the actions in order, then check every assertion.

use anyhow::{Context, Result, bail};
use stack_lab_abstract::{ScenarioAction, ScenarioAssertion, StackConfig, TestScenario};

use crate::pipeline::StackPipeline;
use crate::trace::{Outcome, SessionReport};

pub fn run_scenario(scenario: &TestScenario, base_config: StackConfig) -> Result<SessionReport> {
    let mut config = base_config;
    scenario.config.apply_to(&mut config);
    let mut pipeline = StackPipeline::new(config);

    for action in &scenario.actions {
        apply_action(&mut pipeline, action)
            .with_context(|| format!("scenario '{}': action failed", scenario.name))?;
    }
    for assertion in &scenario.assertions {
        check_assertion(&pipeline, assertion)
            .with_context(|| format!("scenario '{}': assertion failed", scenario.name))?;
    }
    Ok(pipeline.report())
}

fn apply_action(pipeline: &mut StackPipeline, action: &ScenarioAction) -> Result<()> {
    match action {
        ScenarioAction::Establish {
            client_isn,
            server_isn,
        } => {
            pipeline.establish(*client_isn, *server_isn)?;
        }
        ScenarioAction::Send { payload } => {
            pipeline.send(payload.as_bytes())?;
        }
        ScenarioAction::SetLoss { active } => pipeline.set_loss_active(*active),
        ScenarioAction::ForceLossOnce => pipeline.force_loss_once(),
        ScenarioAction::CorruptNetworkByteOnce { offset, mask } => {
            pipeline.corrupt_network_byte_once(*offset, *mask);
        }
        ScenarioAction::CongestionEvent => pipeline.trigger_congestion_event(),
    }
    Ok(())
}

fn check_assertion(pipeline: &StackPipeline, assertion: &ScenarioAssertion) -> Result<()> {
    let ctx = pipeline.context();
    match assertion {
        ScenarioAssertion::StateEstablished => {
            if !ctx.machine.is_established() {
                bail!("expected ESTABLISHED, got {}", ctx.machine.state().as_str());
            }
        }
        ScenarioAssertion::ClientSeq { equals } => {
            let seq = ctx.machine.client().seq;
            if seq != *equals {
                bail!("client seq is {seq}, expected {equals}");
            }
        }
        ScenarioAssertion::ClientAck { equals } => {
            let ack = ctx.machine.client().ack;
            if ack != *equals {
                bail!("client ack is {ack}, expected {equals}");
            }
        }
        ScenarioAssertion::ServerAck { equals } => {
            let ack = ctx.machine.server().ack;
            if ack != *equals {
                bail!("server ack is {ack}, expected {equals}");
            }
        }
        ScenarioAssertion::LastOutcome { lost } => {
            let cycle = pipeline
                .last_cycle()
                .context("no transmission cycle has run")?;
            let was_lost = cycle.outcome == Outcome::Lost;
            if was_lost != *lost {
                bail!("last outcome was {:?}, expected lost={lost}", cycle.outcome);
            }
        }
        ScenarioAssertion::AllLayersValid => {
            let cycle = pipeline
                .last_cycle()
                .context("no transmission cycle has run")?;
            if !cycle.verdicts.all_valid() {
                bail!("expected all layers valid, got {:?}", cycle.verdicts);
            }
        }
        ScenarioAssertion::LayerInvalid { layer } => {
            let cycle = pipeline
                .last_cycle()
                .context("no transmission cycle has run")?;
            let v = cycle.verdicts;
            let valid = match layer.as_str() {
                "physical" => v.physical,
                "link" => v.link,
                "network" => v.network,
                "transport" => v.transport,
                "application" => v.application,
                other => bail!("unknown layer '{other}'"),
            };
            if valid {
                bail!("expected layer '{layer}' to fail validation, but it passed");
            }
        }
        ScenarioAssertion::Cwnd { equals } => {
            let cwnd = ctx.congestion.cwnd();
            if cwnd != *equals {
                bail!("cwnd is {cwnd}, expected {equals}");
            }
        }
        ScenarioAssertion::Ssthresh { equals } => {
            let ssthresh = ctx.congestion.ssthresh();
            if ssthresh != *equals {
                bail!("ssthresh is {ssthresh}, expected {equals}");
            }
        }
        ScenarioAssertion::Retransmissions { min } => {
            let count = ctx.counters.retransmissions;
            if count < *min {
                bail!("retransmissions is {count}, expected at least {min}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stack_lab_abstract::ScenarioOverride;

    fn scenario(actions: Vec<ScenarioAction>, assertions: Vec<ScenarioAssertion>) -> TestScenario {
        TestScenario {
            name: "inline".to_string(),
            description: String::new(),
            config: ScenarioOverride::default(),
            actions,
            assertions,
        }
    }

    #[test]
    fn clean_transfer_scenario_passes() {
        let scenario = scenario(
            vec![
                ScenarioAction::Establish {
                    client_isn: Some(1000),
                    server_isn: Some(5000),
                },
                ScenarioAction::Send {
                    payload: "GET / HTTP/1.1".to_string(),
                },
            ],
            vec![
                ScenarioAssertion::StateEstablished,
                ScenarioAssertion::ClientSeq { equals: 1015 },
                ScenarioAssertion::ServerAck { equals: 1015 },
                ScenarioAssertion::AllLayersValid,
                ScenarioAssertion::LastOutcome { lost: false },
            ],
        );
        run_scenario(&scenario, StackConfig::default()).unwrap();
    }

    #[test]
    fn failing_assertion_names_the_scenario() {
        let scenario = scenario(
            vec![ScenarioAction::Establish {
                client_isn: Some(1000),
                server_isn: Some(5000),
            }],
            vec![ScenarioAssertion::ClientSeq { equals: 9999 }],
        );
        let err = run_scenario(&scenario, StackConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("inline"));
    }

    #[test]
    fn send_without_establish_fails_the_scenario() {
        let scenario = scenario(
            vec![ScenarioAction::Send {
                payload: "data".to_string(),
            }],
            vec![],
        );
        assert!(run_scenario(&scenario, StackConfig::default()).is_err());
    }
}
