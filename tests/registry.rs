use hwring::sim::SimComponent;
use hwring::{BufferRequest, Config, Error, ErrorReporter, PoolRegistry, PortIndex, Session};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn full_registry_is_exhausted_before_any_allocation() {
    let registry = PoolRegistry::new(2, Arc::new(ErrorReporter::new()));
    let sim = Arc::new(SimComponent::new("camera").with_port(PortIndex(71), 64, 3));
    registry.create(sim.clone(), BufferRequest::new(PortIndex(71))).unwrap();
    registry.create(sim.clone(), BufferRequest::new(PortIndex(71))).unwrap();
    assert_eq!(sim.allocated(), 6);

    let err = registry.create(sim.clone(), BufferRequest::new(PortIndex(71))).unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(_)));
    assert_eq!(sim.allocated(), 6);
    assert_eq!(registry.len(), 2);
}

#[test]
fn destroy_all_returns_every_hardware_buffer() {
    let registry = PoolRegistry::new(8, Arc::new(ErrorReporter::new()));
    let camera = Arc::new(SimComponent::new("camera").with_port(PortIndex(71), 64, 1));
    let render = Arc::new(SimComponent::new("render").with_port(PortIndex(90), 64, 3));

    let cam = registry.create(camera.clone(), BufferRequest::new(PortIndex(71))).unwrap();
    let ren = registry.create(render.clone(), BufferRequest::new(PortIndex(90))).unwrap();
    let _frame = ren.acquire().unwrap().unwrap();
    cam.destroy().unwrap();

    assert_eq!(registry.destroy_all(), 2);
    assert!(registry.is_empty());
    assert_eq!(camera.live_buffers(), 0);
    assert_eq!(render.live_buffers(), 0);
    assert_eq!(render.released(), 3);
    assert_eq!(registry.destroy_all(), 0);
}

#[test]
fn enumeration_and_lookup_agree() {
    let registry = PoolRegistry::new(4, Arc::new(ErrorReporter::new()));
    let sim = Arc::new(SimComponent::new("render").with_port(PortIndex(90), 64, 1));
    let pools: Vec<_> = (0..3)
        .map(|_| registry.create(sim.clone(), BufferRequest::new(PortIndex(90))).unwrap())
        .collect();

    let ids = registry.ids();
    assert_eq!(ids.len(), 3);
    for (id, pool) in ids.iter().zip(&pools) {
        assert!(Arc::ptr_eq(&registry.get(*id).unwrap(), pool));
    }
}

#[test]
fn concurrent_creation_never_shares_a_slot() {
    let registry = Arc::new(PoolRegistry::new(16, Arc::new(ErrorReporter::new())));
    let sim = Arc::new(SimComponent::new("render").with_port(PortIndex(90), 64, 2));

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let registry = registry.clone();
            let sim = sim.clone();
            thread::spawn(move || registry.create(sim, BufferRequest::new(PortIndex(90))).map(|p| p.id()))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut slots: Vec<usize> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().and_then(|id| id.map(|id| id.slot())))
        .collect();
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), 16);
    assert_eq!(
        results.iter().filter(|r| matches!(r, Err(Error::ResourceExhausted(_)))).count(),
        8
    );
    assert_eq!(sim.live_buffers(), 32);
    registry.destroy_all();
    assert_eq!(sim.live_buffers(), 0);
}

#[test]
fn repeated_sessions_do_not_leak() {
    let sim = Arc::new(SimComponent::new("render").with_port(PortIndex(90), 64, 3));
    for _ in 0..5 {
        let session = Session::new(Config::default());
        session.create_pool(sim.clone(), BufferRequest::new(PortIndex(90))).unwrap();
        session.create_pool(sim.clone(), BufferRequest::new(PortIndex(90))).unwrap();
        assert_eq!(sim.live_buffers(), 6);
        session.shutdown();
        assert_eq!(sim.live_buffers(), 0);
    }
}

#[test]
fn error_callback_may_query_the_registry() {
    let reporter = Arc::new(ErrorReporter::new());
    let registry = Arc::new(PoolRegistry::new(2, reporter.clone()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let registry = Arc::downgrade(&registry);
        let seen = seen.clone();
        reporter.set_callback(move |_| {
            if let Some(registry) = registry.upgrade() {
                seen.lock().unwrap().push((registry.len(), registry.ids().len()));
            }
        });
    }

    let sim = Arc::new(
        SimComponent::new("render")
            .with_port(PortIndex(90), 64, 3)
            .fail_allocation_at(2),
    );
    let (tx, rx) = mpsc::channel();
    {
        let registry = registry.clone();
        thread::spawn(move || {
            let _ = tx.send(registry.create(sim, BufferRequest::new(PortIndex(90))).is_err());
        });
    }

    let failed = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("create blocked while the callback read the registry");
    assert!(failed);
    assert_eq!(*seen.lock().unwrap(), vec![(0, 0)]);
    assert!(registry.is_empty());
}
