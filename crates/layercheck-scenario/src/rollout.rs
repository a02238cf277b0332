//! Rolling a built image out to one node and checking it there

use rand::seq::SliceRandom;
use tracing::{info, warn};

use layercheck_common::mutate::mutate_with_retry;
use layercheck_common::node_role_label;
use layercheck_common::resources::{Named, Node};
use layercheck_common::wait::wait_for_condition;
use layercheck_common::{Error, Result};

use crate::fixtures::ScenarioContext;
use crate::options::RolloutOptions;
use crate::outcome::RolloutOutcome;
use crate::predicates;

fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// The configured target node, or a random healthy node of the rollout role
/// that is not already in the pool
async fn select_node(ctx: &ScenarioContext<'_>, rollout: &RolloutOptions) -> Result<Node> {
    let nodes = ctx.cp().nodes();

    if let Some(target) = ctx.options.target_nodes.first() {
        return Ok(nodes.get(target).await?.object);
    }

    let candidates: Vec<Node> = nodes
        .list()
        .await?
        .into_iter()
        .map(|v| v.object)
        .filter(|n| {
            n.has_role(&rollout.node_role)
                && !n.has_role(&ctx.options.pool_name)
                && !n.is_degraded()
        })
        .collect();

    let chosen = candidates.choose(&mut rand::thread_rng()).cloned();
    chosen.ok_or_else(|| Error::not_found(Node::KIND, format!("any {} node", rollout.node_role)))
}

/// Delete the node and then its backing machine; either may already be gone
fn register_node_deletion(ctx: &ScenarioContext<'_>, node: &Node) {
    let control_plane = ctx.control_plane.clone();
    let name = node.name.clone();
    let machine = node.machine.clone();
    let label = match &machine {
        Some(m) => format!("delete Node {} and Machine {}", name, m),
        None => format!("delete Node {}", name),
    };

    ctx.registry.register(label, move || async move {
        ignore_not_found(control_plane.nodes().delete(&name).await)?;
        if let Some(machine) = machine {
            ignore_not_found(control_plane.machines().delete(&machine).await)?;
        }
        Ok(())
    });
}

/// Move a node into the pool, wait for it to boot `image`, and run the
/// verification command on it
pub(crate) async fn rollout(
    ctx: &ScenarioContext<'_>,
    image: &str,
    rollout: &RolloutOptions,
) -> Result<RolloutOutcome> {
    let node = select_node(ctx, rollout).await?;
    info!(node = %node.name, image = %image, "Rolling out to node");

    if rollout.delete_node_on_cleanup {
        register_node_deletion(ctx, &node);
    } else {
        warn!(node = %node.name, "Node will keep running the test image after teardown");
    }

    let role_label = node_role_label(&ctx.options.pool_name);
    mutate_with_retry(
        ctx.cp().nodes(),
        &node.name,
        ctx.conflict_retry,
        |n: &mut Node| {
            n.labels.insert(role_label.clone(), String::new());
        },
    )
    .await?;
    ctx.register_unlabel::<Node>(&node.name, &role_label);

    wait_for_condition(
        ctx.cp().nodes(),
        &node.name,
        &ctx.wait_config("node boots built image", ctx.options.timeouts.node_image()),
        predicates::node_image(image),
    )
    .await?;

    let output = ctx
        .cp()
        .executor()
        .exec(&node.name, &rollout.verify_command)
        .await?;
    info!(node = %node.name, output = %output.trim(), "Verified image on node");

    Ok(RolloutOutcome {
        node: node.name,
        output,
    })
}
