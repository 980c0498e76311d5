//! Simulated camera -> renderer pipeline.
//!
//! A producer thread fills renderer input buffers from the ring and a
//! consumer thread plays the renderer, draining them in issue order. Run with
//! `RUST_LOG=hwring=debug` to see pool and state traffic.

use hwring::sim::SimComponent;
use hwring::{
    BufferRequest, Component, ComponentState, Config, Error, PortIndex, Session, StateNotifier,
    StateSynchronizer,
};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CAMERA_OUT: PortIndex = PortIndex(71);
const RENDER_IN: PortIndex = PortIndex(90);
const WIDTH: usize = 640;
const HEIGHT: usize = 480;
const FRAMES: usize = 125;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let frame_size = WIDTH * HEIGHT * 3 / 2;
    let notifier = Arc::new(StateNotifier::new());
    let camera = Arc::new(
        SimComponent::new("camera")
            .with_port(CAMERA_OUT, frame_size, 1)
            .with_transition_delay(Duration::from_millis(5))
            .with_notifier(notifier.clone()),
    );
    let render = Arc::new(
        SimComponent::new("render")
            .with_port(RENDER_IN, frame_size, 3)
            .with_transition_delay(Duration::from_millis(5))
            .with_notifier(notifier.clone()),
    );

    let session = Session::new(Config::default());
    session.set_error_callback(|err| tracing::error!("component failure {}", err));
    let sync = session.joint_synchronizer().with_notifier(notifier);

    // Loaded -> Idle completes once every enabled port has its buffers.
    for component in [&camera, &render] {
        session
            .reporter()
            .report(component.request_state(ComponentState::Idle))
            .map_err(|e| Error::hardware(component.name(), "request_state", e))?;
    }
    let _camera_out = session.create_pool(camera.clone(), BufferRequest::new(CAMERA_OUT))?;
    let render_in = session.create_pool(render.clone(), BufferRequest::new(RENDER_IN))?;
    sync.wait_all(ComponentState::Idle, &[&*render, &*camera])?;
    tracing::info!("components idle");

    sync.request_all(ComponentState::Executing, &[&*camera, &*render])?;
    tracing::info!("components executing");

    let (tx, rx) = mpsc::channel();
    let producer = {
        let pool = render_in.clone();
        thread::spawn(move || -> Result<(), Error> {
            let mut frames = 0;
            while frames < FRAMES {
                match pool.acquire()? {
                    Some(buffer) => {
                        tracing::debug!(slot = buffer.slot(), "buffer filled");
                        if tx.send(buffer).is_err() {
                            break;
                        }
                        frames += 1;
                    }
                    None => thread::sleep(Duration::from_micros(200)),
                }
            }
            Ok(())
        })
    };
    let consumer = {
        let pool = render_in.clone();
        thread::spawn(move || -> Result<usize, Error> {
            let mut rendered = 0;
            for buffer in rx {
                thread::sleep(Duration::from_millis(1));
                pool.release(buffer)?;
                rendered += 1;
            }
            Ok(rendered)
        })
    };

    producer.join().expect("producer panicked")?;
    let rendered = consumer.join().expect("consumer panicked")?;
    tracing::info!(rendered, "capture stopped");

    // Executing -> Idle -> Loaded; buffers must go before Loaded completes.
    sync.request_all(ComponentState::Idle, &[&*camera, &*render])?;
    for component in [&camera, &render] {
        if StateSynchronizer::is_state(Some(&**component), ComponentState::Idle) {
            session
                .reporter()
                .report(component.request_state(ComponentState::Loaded))
                .map_err(|e| Error::hardware(component.name(), "request_state", e))?;
        }
    }
    let destroyed = session.shutdown();
    sync.wait_all(ComponentState::Loaded, &[&*camera, &*render])?;
    tracing::info!(destroyed, "pipeline torn down");
    Ok(())
}
