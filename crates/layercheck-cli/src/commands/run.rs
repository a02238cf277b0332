//! Run command

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};

use layercheck_common::resources::BuilderType;
use layercheck_common::store::ControlPlane;
use layercheck_kube::client::create_client;
use layercheck_kube::KubeControlPlane;
use layercheck_scenario::{ScenarioOrchestrator, SuiteReport};

use crate::config::{self, Overrides};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenarios to run, by name (all when omitted)
    pub scenarios: Vec<String>,

    /// Suite file with scenario definitions (built-in scenarios when omitted)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Kubeconfig for the cluster under test (inferred when omitted)
    #[arg(long, env = "LAYERCHECK_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Run in this pool instead of each scenario's own
    #[arg(long, env = "LAYERCHECK_POOL")]
    pub pool: Option<String>,

    /// Builder backend to use for every scenario
    #[arg(long)]
    pub builder: Option<BuilderType>,

    /// Leave every created resource in place for debugging
    #[arg(
        long,
        env = "LAYERCHECK_SKIP_CLEANUP",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub skip_cleanup: bool,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            pool: self.pool.clone(),
            builder: self.builder,
            skip_cleanup: self.skip_cleanup,
        }
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let overrides = args.overrides();
    let scenarios: Vec<_> =
        config::select(config::available(args.config.as_deref())?, &args.scenarios)?
            .into_iter()
            .map(|s| overrides.apply(s))
            .collect();
    if scenarios.is_empty() {
        return Err(Error::NothingToRun);
    }
    for scenario in &scenarios {
        scenario.validate()?;
    }
    if overrides.skip_cleanup {
        warn!("Cleanup disabled: fixtures will be left on the cluster");
    }

    let client = create_client(args.kubeconfig.as_deref()).await?;
    let control_plane: Arc<dyn ControlPlane> = Arc::new(KubeControlPlane::new(client));

    info!(count = scenarios.len(), "Running scenarios");
    let mut report = SuiteReport::new("on-cluster builds");
    for scenario in scenarios {
        let orchestrator = ScenarioOrchestrator::new(control_plane.clone(), scenario);
        if let Some(outcome) = report.run(&orchestrator).await {
            if let Some(rollout) = &outcome.rollout {
                info!(node = %rollout.node, "Rollout verified");
            }
            info!(
                scenario = %outcome.scenario,
                cleanup = %outcome.cleanup.summary(),
                "Scenario finished"
            );
        }
    }

    report.finish()?;
    Ok(())
}
