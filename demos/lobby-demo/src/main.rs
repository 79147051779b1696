//! Runs a whole lobby in one process: a host, two guests and two AI
//! riders, through ready-up and match start.
//!
//! `RUST_LOG=debug cargo run -p lobby-demo` shows the wire traffic.

use std::time::Duration;

use cavalry::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lobby_demo=info,cavalry=info,cavalry_lobby=info".into()),
        )
        .init();

    let relay = LocalRelay::new();
    let host = LobbyService::new(relay.clone(), LobbyConfig::default());
    let mut host_events = host.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = host_events.recv().await {
            tracing::info!(?event, "host saw");
        }
    });

    let settings = RoomSettings {
        room_name: "Dawn Raid".into(),
        game_mode: GameMode::TeamDeathmatch,
        ..RoomSettings::default()
    };
    let code = host.create_room(settings, "Aldric").await?;
    tracing::info!(%code, "room is open");

    let mut guests = Vec::new();
    for name in ["Brenna", "Cassius"] {
        let guest = LobbyService::new(relay.clone(), LobbyConfig::default());
        guest.join_room(code.as_str(), name).await?;
        guests.push(guest);
    }

    host.add_cpu_player(AiDifficulty::Easy, 0).await?;
    host.add_cpu_player(AiDifficulty::Hard, 1).await?;

    if let Err(e) = host.start_match().await {
        tracing::info!(error = %e, "start refused as expected");
    }

    host.set_ready(true).await?;
    for guest in &guests {
        guest.set_customization("Lancer").await?;
        guest.set_ready(true).await?;
    }

    // Guest requests are applied by the host asynchronously.
    while !host.slots().await.iter().all(|s| s.is_empty() || s.is_ready) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for slot in host.slots().await.iter().filter(|s| !s.is_empty()) {
        tracing::info!(
            slot = slot.slot_index,
            player = %slot.player_id,
            name = %slot.player_name,
            team = slot.team_index,
            "seated"
        );
    }

    host.start_match().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    for guest in &guests {
        guest.leave_room().await?;
    }
    host.leave_room().await?;
    Ok(())
}
