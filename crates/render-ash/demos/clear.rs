//! Headless demo: clears an offscreen render target a few times and reports
//! the GPU time of each clear.

use forge_render_ash::{
    render::{
        commands::{LoadActionType, LoadActionsDesc, QueryPoolDesc, QueryType},
        format::TextureFormat,
        settings::RendererDesc,
        state::{CmdPoolDesc, QueueDesc, QueueType, ResourceState},
        texture::{ClearValue, RenderTargetDesc},
    },
    BindRenderTargetsDesc, QueueSubmitDesc, RenderTargetBarrier, RenderTargetBinding, Renderer,
};
use tracing::info;

const FRAMES: u32 = 4;

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .init();

    info!("Initializing...");
    let renderer = Renderer::new("forge clear demo", &RendererDesc::default())?;
    renderer.set_device_lost_callback(|lost| {
        for checkpoint in &lost.checkpoints {
            tracing::error!("lost at {}", checkpoint);
        }
    });
    let ctx = renderer.thread_context();
    let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics))?;
    let mut pool = renderer.add_cmd_pool(&queue, &CmdPoolDesc::default())?;
    let fence = renderer.add_fence()?;

    let mut target_desc = RenderTargetDesc::new(256, 256, TextureFormat::Rgba8Unorm);
    target_desc.name = Some("clear target".into());
    target_desc.clear_value = ClearValue::Color([0.1, 0.2, 0.3, 1.0]);
    let target = renderer.add_render_target(&target_desc)?;

    let timestamps = renderer.add_query_pool(&QueryPoolDesc {
        query_type: QueryType::Timestamp,
        query_count: 2,
        ..Default::default()
    })?;

    let mut load_actions = LoadActionsDesc::default();
    load_actions.load_actions_color[0] = LoadActionType::Clear;
    load_actions.clear_color_values[0] = target_desc.clear_value;

    for frame in 0..FRAMES {
        let mut cmd = pool.add_cmd(&ctx)?;
        cmd.begin()?;
        cmd.reset_query_pool(&timestamps, 0, 2);
        cmd.begin_query(&timestamps, 0);
        cmd.begin_debug_marker([1.0, 0.5, 0.0], "clear");
        if frame > 0 {
            cmd.resource_barrier(
                &[],
                &[],
                &[RenderTargetBarrier {
                    render_target: &target,
                    current_state: ResourceState::SHADER_RESOURCE,
                    new_state: ResourceState::RENDER_TARGET,
                    subresource: None,
                }],
            );
        }
        let bindings = [RenderTargetBinding::new(&target)];
        cmd.bind_render_targets(Some(&BindRenderTargetsDesc {
            render_targets: &bindings,
            depth_stencil: None,
            load_actions,
        }))?;
        cmd.bind_render_targets(None)?;
        cmd.resource_barrier(
            &[],
            &[],
            &[RenderTargetBarrier {
                render_target: &target,
                current_state: ResourceState::RENDER_TARGET,
                new_state: ResourceState::SHADER_RESOURCE,
                subresource: None,
            }],
        );
        cmd.end_debug_marker();
        cmd.end_query(&timestamps, 1);
        cmd.end()?;

        queue.submit(&QueueSubmitDesc {
            cmds: &[&cmd],
            signal_fence: Some(&fence),
            ..Default::default()
        })?;
        renderer.wait_for_fences(&[&fence])?;

        let ticks = timestamps.data(0, 2)?;
        let nanos = ticks[1].saturating_sub(ticks[0]) as f64 * f64::from(timestamps.timestamp_period());
        info!("frame {}: clear took {:.3} us", frame, nanos / 1000.0);
        drop(cmd);
        pool.reset()?;
    }

    let stats = renderer.memory_stats();
    info!(
        "memory: {} bytes in {} allocations",
        stats.used_bytes, stats.allocation_count
    );
    Ok(())
}
