//! Link tests against a fake vehicle on localhost UDP

use std::net::SocketAddr;
use std::time::Duration;

use mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, ATTITUDE_DATA, HEARTBEAT_DATA,
};
use mavlink::MavHeader;
use osd_telemetry::error::OsdError;
use osd_telemetry::link::decoder::parse_datagram;
use osd_telemetry::link::encoder::encode_frame;
use osd_telemetry::link::session::{supervise, SessionConfig};
use osd_telemetry::link::transport::UdpTransport;
use osd_telemetry::link::{Endpoint, MavlinkLink, Target};
use osd_telemetry::config::Config;
use osd_telemetry::telemetry::{Aggregator, NotifyPolicy, TelemetryState};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const VEHICLE_SYSTEM: u8 = 1;

fn vehicle_frame(message: &MavMessage) -> Vec<u8> {
    let header = MavHeader {
        system_id: VEHICLE_SYSTEM,
        component_id: 1,
        sequence: 0,
    };
    encode_frame(header, message).unwrap()
}

fn vehicle_heartbeat() -> Vec<u8> {
    vehicle_frame(&MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_STANDBY,
        mavlink_version: 3,
    }))
}

/// Wait for a datagram from the GCS and return its source
async fn await_gcs(vehicle: &UdpSocket) -> SocketAddr {
    let mut buf = [0u8; 1024];
    let (len, gcs) = timeout(Duration::from_secs(2), vehicle.recv_from(&mut buf))
        .await
        .expect("GCS should announce itself")
        .unwrap();
    assert!(!parse_datagram(&buf[..len]).unwrap().is_empty());
    gcs
}

#[tokio::test]
async fn udpout_handshake_with_fake_vehicle() {
    let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let endpoint: Endpoint = format!("udpout:{}", vehicle.local_addr().unwrap()).parse().unwrap();
    let cancel = CancellationToken::new();

    let connect = MavlinkLink::<UdpTransport>::connect(&endpoint, Duration::from_secs(2), &cancel);
    let respond = async {
        let gcs = await_gcs(&vehicle).await;
        vehicle.send_to(&vehicle_heartbeat(), gcs).await.unwrap();
    };

    let (link, ()) = tokio::join!(connect, respond);
    let link = link.unwrap();
    assert_eq!(link.target(), Target { system: VEHICLE_SYSTEM, component: 1 });
    assert_eq!(link.peer(), vehicle.local_addr().unwrap());
}

#[tokio::test]
async fn udpin_handshake_times_out_without_vehicle() {
    let endpoint: Endpoint = "udpin:127.0.0.1:0".parse().unwrap();

    let result = MavlinkLink::<UdpTransport>::connect(&endpoint, Duration::from_millis(50), &CancellationToken::new()).await;

    assert!(matches!(result, Err(OsdError::LinkTimeout(50))));
}

#[tokio::test]
async fn supervised_link_feeds_aggregator() {
    let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut config = Config::default();
    config.link.endpoint = format!("udpout:{}", vehicle.local_addr().unwrap());
    config.link.handshake_timeout_ms = 2000;
    config.rates.ack_wait_ms = 1;
    let session = SessionConfig::from_config(&config).unwrap();

    let (aggregator, handle) = Aggregator::new(TelemetryState::new(), NotifyPolicy::default());
    let cancel = CancellationToken::new();
    aggregator.start(cancel.clone());
    let supervisor = tokio::spawn(supervise(session, handle.clone(), cancel.clone()));

    let gcs = await_gcs(&vehicle).await;
    vehicle.send_to(&vehicle_heartbeat(), gcs).await.unwrap();

    let mut listener = handle.subscribe();
    let mut attitude = ATTITUDE_DATA::default();
    attitude.pitch = -std::f32::consts::FRAC_PI_6;

    // keep sending until the session is up and the update lands
    timeout(Duration::from_secs(3), async {
        loop {
            vehicle
                .send_to(&vehicle_frame(&MavMessage::ATTITUDE(attitude.clone())), gcs)
                .await
                .unwrap();
            if timeout(Duration::from_millis(50), listener.wait_and_consume(&cancel))
                .await
                .is_ok()
            {
                break;
            }
        }
    })
    .await
    .expect("attitude should reach the aggregator");

    let snapshot = handle.snapshot().await.unwrap();
    assert!((snapshot.pitch + 30.0).abs() < 1e-3, "pitch was {}", snapshot.pitch);

    cancel.cancel();
    let result = timeout(Duration::from_secs(2), supervisor).await.unwrap().unwrap();
    assert!(result.is_ok());
}
