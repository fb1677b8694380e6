//! 抛硬币连胜同步演示
//!
//! 使用内存版远端服务，演示在线投掷、离线积累、网络恢复后自动追平以及调试重置。

use std::sync::Arc;
use std::time::Duration;

use flipstreak_sdk::{
    FlipStreakSDK, InMemoryStreakService, ManualNetworkStatusListener, NetworkStatus, Side,
    StreakSyncConfig,
};
use rand::Rng;

fn random_side(rng: &mut impl Rng) -> Side {
    if rng.gen_bool(0.5) {
        Side::Heads
    } else {
        Side::Tails
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let data_dir = tempfile::tempdir()?;
    let config = StreakSyncConfig::builder()
        .data_dir(data_dir.path())
        .debug_mode(true)
        .build()?;

    let remote = InMemoryStreakService::new();
    let network = Arc::new(ManualNetworkStatusListener::online());
    let sdk =
        FlipStreakSDK::initialize_with_remote(config, Arc::new(remote.clone()), network.clone())
            .await?;

    println!("\n==============================================");
    println!("🪙 FlipStreak 同步演示 (identity={})", sdk.identity().short());
    println!("==============================================\n");

    sdk.startup().await?;
    sdk.choose_side(Side::Heads).await?;

    let mut rng = rand::thread_rng();

    println!("📡 在线投掷");
    for _ in 0..6 {
        let outcome = random_side(&mut rng);
        let streak = sdk.record_flip(outcome).await?;
        println!("  {} -> 连胜 {}", outcome, streak);
    }
    sdk.sync_now().await?;
    println!(
        "  本地 {} / 远端 {:?}\n",
        sdk.streak(),
        remote.streak_of(&sdk.identity())
    );

    println!("✈️ 离线投掷");
    network.set_status(NetworkStatus::Offline).await;
    remote.set_offline(true);
    for _ in 0..8 {
        let outcome = random_side(&mut rng);
        let streak = sdk.record_flip(outcome).await?;
        println!("  {} -> 连胜 {}", outcome, streak);
    }
    println!("  同步状态: {:?}\n", sdk.sync_snapshot().state);

    println!("📶 网络恢复");
    remote.set_offline(false);
    network.set_status(NetworkStatus::Online).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    sdk.sync_now().await?;
    println!(
        "  本地 {} / 远端 {:?}, 提交记录 {} 条\n",
        sdk.streak(),
        remote.streak_of(&sdk.identity()),
        remote.submissions().len()
    );

    println!("🧹 调试重置");
    let previous = sdk.identity();
    let fresh = sdk.full_reset().await?;
    println!("  {} -> {}", previous.short(), fresh.short());
    let report = sdk.startup().await?;
    println!("  重置后启动: {:?}", report);

    sdk.shutdown().await?;
    println!("\n✅ 演示完成");
    Ok(())
}
