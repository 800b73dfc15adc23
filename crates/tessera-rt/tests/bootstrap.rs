use tessera_rt::stack::os;
use tessera_rt::{
    BootstrapStack, Flow, OsThreadId, Runtime, RuntimeConfig, RuntimeError, ThreadKind, Value,
};

fn query_config() -> RuntimeConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    RuntimeConfig::default().with_bootstrap_stack(BootstrapStack::Query)
}

#[test]
fn test_current_thread_resolves_after_bootstrap() {
    let runtime = Runtime::new(query_config()).unwrap();
    assert_eq!(runtime.current_thread(), None);
    assert_eq!(runtime.main_thread(), None);
    assert!(matches!(runtime.expect_main_thread(), Err(RuntimeError::NotBootstrapped)));

    let main = runtime.bootstrap().unwrap();
    assert_eq!(runtime.current_thread(), Some(main.clone()));
    assert_eq!(runtime.main_thread(), Some(main.clone()));
    assert!(main.is_main());
    assert_eq!(main.kind(), ThreadKind::Main);
    assert!(main.is_current());
    assert_eq!(main.os_thread(), Some(OsThreadId::current()));
    assert!(runtime.registry().contains(main.id()));
}

#[test]
fn test_bootstrap_extent_covers_the_calling_frame() {
    let runtime = Runtime::init(query_config()).unwrap();
    let main = runtime.expect_main_thread().unwrap();
    let extent = main.stack_extent().expect("bootstrap sets the extent");

    let local = 0usize;
    let here = std::hint::black_box(&local) as *const usize as usize;
    assert!(extent.contains(here));
    if let Some(bounds) = os::current_thread_bounds() {
        assert_eq!(extent.start(), bounds.start());
        assert!(extent.size() <= bounds.size());
    }
}

#[test]
fn test_probe_strategy_falls_back_off_the_initial_thread() {
    // Test functions never run on the process's original thread.
    let runtime = Runtime::init(RuntimeConfig::default()).unwrap();
    let extent = runtime.expect_main_thread().unwrap().stack_extent().unwrap();
    if let Some(bounds) = os::current_thread_bounds() {
        assert_eq!(extent, bounds);
    }
}

#[test]
fn test_bootstrapping_twice_fails() {
    let runtime = Runtime::init(query_config()).unwrap();
    assert!(matches!(runtime.bootstrap(), Err(RuntimeError::AlreadyBootstrapped)));
}

#[test]
fn test_main_thread_is_not_joinable() {
    let runtime = Runtime::init(query_config()).unwrap();
    let main = runtime.expect_main_thread().unwrap();
    assert!(matches!(main.join(), Err(RuntimeError::NotJoinable)));
    assert_eq!(main.value(), None);
    assert!(main.is_alive());
    assert!(main.inspect().ends_with(" run>"));
}

#[test]
fn test_spawned_threads_see_themselves_not_main() {
    let runtime = Runtime::init(query_config()).unwrap();
    let main = runtime.expect_main_thread().unwrap();

    let inner_runtime = runtime.clone();
    let thread = runtime
        .spawn_with(move || {
            let me = inner_runtime.expect_current_thread().unwrap();
            Flow::Return(Value::from_bits(me.is_main() as usize))
        })
        .unwrap();
    thread.join().unwrap();
    assert_eq!(thread.value().and_then(|c| c.value()), Some(Value::from_bits(0)));
    assert_eq!(runtime.current_thread(), Some(main));
}

#[test]
fn test_shutdown_unpublishes_the_main_thread() {
    let runtime = Runtime::init(query_config()).unwrap();
    let handle = runtime.clone();
    let main_id = handle.expect_main_thread().unwrap().id();

    runtime.shutdown();
    assert_eq!(handle.current_thread(), None);
    assert_eq!(handle.main_thread(), None);
    assert!(!handle.registry().contains(main_id));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = query_config().with_stack_size(1024);
    assert!(matches!(Runtime::new(config), Err(RuntimeError::InvalidConfig(_))));
}
