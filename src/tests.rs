use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serial_test::serial;

use super::*;

trait Logger: Send + Sync {
    fn log(&self, content: &str) -> String;
}

#[derive(Default)]
struct PrefixLogger;

impl Logger for PrefixLogger {
    fn log(&self, content: &str) -> String {
        format!("[log] {}", content)
    }
}

impl Component for PrefixLogger {
    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(PrefixLogger)
    }

    fn supertypes() -> Vec<Supertype<Self>> {
        vec![Supertype::of::<dyn Logger>(|c| c as Arc<dyn Logger>)]
    }
}

#[derive(Default)]
struct Clock;
crate::component!(Clock);

#[derive(Default)]
struct Ticket;
crate::component!(Ticket, Stereotype::Component, Scope::Prototype);

fn container_with(registry: &Registry) -> Result<Container, WiringError> {
    Container::builder()
        .registry(registry)
        .value_source(MapValueSource::new())
        .build()
}

fn profiles() -> ActiveProfiles {
    ActiveProfiles::default()
}

#[test]
fn singletons_are_shared_and_prototypes_are_fresh() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<Clock>(&profiles());
    registry.declare::<Ticket>(&profiles());
    let container = container_with(&registry)?;

    let c1 = container.get::<Clock>()?;
    let c2 = container.get::<Clock>()?;
    assert!(Arc::ptr_eq(&c1, &c2));

    let t1 = container.get::<Ticket>()?;
    let t2 = container.get::<Ticket>()?;
    assert!(!Arc::ptr_eq(&t1, &t2));
    Ok(())
}

struct UserRepository {
    id: usize,
}

static REPOSITORY_BUILDS: AtomicUsize = AtomicUsize::new(0);

impl Component for UserRepository {
    const STEREOTYPE: Stereotype = Stereotype::Repository;
    const NAME: Option<&'static str> = Some("userRepo");

    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(UserRepository {
            id: REPOSITORY_BUILDS.fetch_add(1, Ordering::SeqCst),
        })
    }
}

#[test]
fn names_alias_the_class_token() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<UserRepository>(&profiles());
    let container = container_with(&registry)?;

    let by_name = container.get_named::<UserRepository>("userRepo")?;
    let by_type = container.get::<UserRepository>()?;
    assert!(Arc::ptr_eq(&by_name, &by_type));
    assert_eq!(by_name.id, by_type.id);

    let err = container
        .get_named::<UserRepository>("other")
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err.to_string(), r#"No provider for "other""#);
    Ok(())
}

#[test]
fn qualifiers_select_among_providers() -> Result<(), WiringError> {
    let cache = Symbol::new("cache");
    let registry = Registry::new();
    registry.register(
        Provider::value(cache.clone(), "memory").with_qualifiers(["fast", "local"]),
    );
    registry.register(Provider::value(cache.clone(), "disk").with_qualifiers(["local"]));
    let container = container_with(&registry)?;
    let token = Token::from(cache);

    assert_eq!(*container.get_token::<&str>(&token, &["fast"])?, "memory");
    // several candidates: the first registered wins
    assert_eq!(*container.get_token::<&str>(&token, &["local"])?, "memory");
    assert_eq!(*container.get_token::<&str>(&token, &[])?, "memory");

    let err = container.get_token::<&str>(&token, &["remote"]).unwrap_err();
    assert!(matches!(
        err,
        WiringError::NoProvider { ref qualifiers, .. } if qualifiers == &["remote".to_string()]
    ));
    Ok(())
}

trait Store: Send + Sync {
    fn kind(&self) -> &'static str;
}

#[derive(Default)]
struct SqlStore;

#[derive(Default)]
struct CacheStore;

impl Store for SqlStore {
    fn kind(&self) -> &'static str {
        "sql"
    }
}

impl Store for CacheStore {
    fn kind(&self) -> &'static str {
        "cache"
    }
}

impl Component for SqlStore {
    const QUALIFIERS: &'static [&'static str] = &["persistent", "primary"];

    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(SqlStore)
    }

    fn supertypes() -> Vec<Supertype<Self>> {
        vec![Supertype::of::<dyn Store>(|c| c as Arc<dyn Store>)]
    }
}

impl Component for CacheStore {
    const QUALIFIERS: &'static [&'static str] = &["fast", "primary"];

    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(CacheStore)
    }

    fn supertypes() -> Vec<Supertype<Self>> {
        vec![Supertype::of::<dyn Store>(|c| c as Arc<dyn Store>)]
    }
}

#[test]
fn qualifiers_select_among_classes() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<SqlStore>(&profiles());
    registry.declare::<CacheStore>(&profiles());
    let container = container_with(&registry)?;

    assert_eq!(container.get_dyn_qualified::<dyn Store>(&["fast"])?.kind(), "cache");
    assert_eq!(container.get_dyn_qualified::<dyn Store>(&["persistent"])?.kind(), "sql");
    assert_eq!(
        container
            .get_dyn_qualified::<dyn Store>(&["fast", "primary"])?
            .kind(),
        "cache"
    );
    assert!(matches!(
        container.get_dyn_qualified::<dyn Store>(&["fast", "persistent"]),
        Err(WiringError::NoProvider { .. })
    ));
    Ok(())
}

#[test]
fn duplicate_registrations_resolve_to_the_first() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.register(Provider::value("port", 80u16));
    registry.register(Provider::value("port", 8080u16));
    let container = container_with(&registry)?;
    assert_eq!(*container.get_named::<u16>("port")?, 80);
    Ok(())
}

struct Target {
    logger: Arc<dyn Logger>,
    prefix: Option<Arc<String>>,
    greeting: String,
    greeting_at_post_construct: String,
}

impl Component for Target {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(Target {
            logger: container.get_dyn()?,
            prefix: None,
            greeting: String::new(),
            greeting_at_post_construct: String::new(),
        })
    }

    fn inject_fields(&mut self, container: &Container) -> Result<(), WiringError> {
        self.prefix = Some(container.get_named("prefix")?);
        Ok(())
    }

    fn inject_values(&mut self, values: &Values<'_>) -> Result<(), WiringError> {
        self.greeting = values.require("app.greeting")?;
        Ok(())
    }

    fn post_construct(&mut self) -> Result<(), WiringError> {
        self.greeting_at_post_construct = self.greeting.clone();
        Ok(())
    }
}

fn target_registry() -> Registry {
    let registry = Registry::new();
    registry.declare::<PrefixLogger>(&profiles());
    registry.declare::<Target>(&profiles());
    registry.register(Provider::value("prefix", ">> ".to_string()));
    registry
}

#[test]
fn constructor_field_and_value_injection() -> Result<(), WiringError> {
    let registry = target_registry();
    let container = Container::builder()
        .registry(&registry)
        .value_source(MapValueSource::new().with("app.greeting", "hello"))
        .build()?;

    let target = container.get::<Target>()?;
    assert_eq!(target.logger.log("ready"), "[log] ready");
    assert_eq!(target.prefix.as_deref().map(String::as_str), Some(">> "));
    assert_eq!(target.greeting, "hello");
    assert_eq!(target.greeting_at_post_construct, "hello");
    Ok(())
}

#[test]
fn missing_values_fail_with_the_key() -> Result<(), WiringError> {
    let registry = target_registry();
    let container = container_with(&registry)?;

    match container.get::<Target>() {
        Err(WiringError::MissingValue { key, component }) => {
            assert_eq!(key, "app.greeting");
            assert!(component.ends_with("Target"));
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn trait_requests_share_the_concrete_singleton() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<PrefixLogger>(&profiles());
    let container = container_with(&registry)?;

    let concrete = container.get::<PrefixLogger>()?;
    let logger = container.get_dyn::<dyn Logger>()?;
    assert_eq!(
        Arc::as_ptr(&concrete) as *const (),
        Arc::as_ptr(&logger) as *const ()
    );

    // the concrete class is not a supertype of itself
    assert!(ClassDef::of::<PrefixLogger>().extends(TypeKey::of::<dyn Logger>()));
    assert!(!ClassDef::of::<PrefixLogger>().extends(TypeKey::of::<PrefixLogger>()));
    Ok(())
}

#[test]
fn trait_objects_can_be_registered_as_values() -> Result<(), WiringError> {
    let registry = Registry::new();
    let logger: Arc<dyn Logger> = Arc::new(PrefixLogger);
    registry.register(
        Provider::value(Token::of::<dyn Logger>(), logger).with_qualifiers(["console"]),
    );
    let container = container_with(&registry)?;

    let logger = container.get_dyn_qualified::<dyn Logger>(&["console"])?;
    assert_eq!(logger.log("x"), "[log] x");
    assert!(container.get_dyn_qualified::<dyn Logger>(&["file"]).is_err());
    Ok(())
}

static REQUEST_IDS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct DatabaseConfig;

impl Component for DatabaseConfig {
    const STEREOTYPE: Stereotype = Stereotype::Configuration;

    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(DatabaseConfig)
    }

    fn beans() -> Vec<BeanMethod<Self>> {
        vec![
            BeanMethod::new("connectionString", |_: &DatabaseConfig, c: &Container| {
                let host = c.values().get("db.host").unwrap_or_else(|| "localhost".into());
                Ok(format!("db://{}", host))
            }),
            BeanMethod::new("requestId", |_: &DatabaseConfig, _: &Container| {
                Ok(REQUEST_IDS.fetch_add(1, Ordering::SeqCst))
            })
            .alias("nextId")
            .scope(Scope::Prototype),
        ]
    }
}

#[test]
fn configuration_beans_are_registered_at_build() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<DatabaseConfig>(&profiles());
    let container = Container::builder()
        .registry(&registry)
        .value_source(MapValueSource::new().with("db.host", "db.local"))
        .build()?;
    assert_eq!(container.providers().len(), 3);
    // the registry itself is untouched
    assert_eq!(registry.len(), 1);

    let c1 = container.get_named::<String>("connectionString")?;
    let c2 = container.get_named::<String>("connectionString")?;
    assert_eq!(*c1, "db://db.local");
    assert!(Arc::ptr_eq(&c1, &c2));

    let id1 = container.get_named::<usize>("nextId")?;
    let id2 = container.get_named::<usize>("nextId")?;
    assert_ne!(*id1, *id2);
    assert!(container.get_named::<usize>("requestId").is_err());
    Ok(())
}

struct Ping {
    pong: Deferred<Pong>,
}

struct Pong {
    ping: Deferred<Ping>,
}

impl Component for Ping {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(Ping {
            pong: container.get_deferred()?,
        })
    }
}

impl Component for Pong {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        let ping: Deferred<Ping> = container.get_deferred()?;
        // Ping is still under construction
        assert!(!ping.is_ready());
        assert!(matches!(ping.get(), Err(WiringError::NotReady { .. })));
        Ok(Pong { ping })
    }
}

#[test]
fn deferred_references_break_cycles() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<Ping>(&profiles());
    registry.declare::<Pong>(&profiles());
    let container = container_with(&registry)?;

    let ping = container.get::<Ping>()?;
    let pong = container.get::<Pong>()?;
    assert!(Arc::ptr_eq(&ping.pong.get()?, &pong));
    assert!(Arc::ptr_eq(&pong.ping.get()?, &ping));
    Ok(())
}

trait Player: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Server {
    receiver: Deferred<Receiver>,
}

struct Receiver {
    server: Deferred<Arc<dyn Player>>,
}

impl Player for Server {
    fn name(&self) -> &'static str {
        "server"
    }
}

impl Component for Server {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(Server {
            receiver: container.get_deferred()?,
        })
    }

    fn supertypes() -> Vec<Supertype<Self>> {
        vec![Supertype::of::<dyn Player>(|c| c as Arc<dyn Player>)]
    }
}

impl Component for Receiver {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        let server: Deferred<Arc<dyn Player>> =
            container.deferred(&Token::of::<dyn Player>(), &[])?;
        assert!(!server.is_ready());
        Ok(Receiver { server })
    }
}

#[test]
fn deferred_trait_objects_resolve_after_the_cycle() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<Server>(&profiles());
    registry.declare::<Receiver>(&profiles());
    let container = container_with(&registry)?;

    let server = container.get::<Server>()?;
    let receiver = container.get::<Receiver>()?;
    assert!(Arc::ptr_eq(&server.receiver.get()?, &receiver));

    assert!(receiver.server.is_ready());
    let player = receiver.server.get()?;
    assert_eq!(player.name(), "server");
    assert_eq!(
        Arc::as_ptr(&server) as *const (),
        Arc::as_ptr(&*player) as *const ()
    );
    Ok(())
}

struct Chicken {
    _egg: Arc<Egg>,
}

struct Egg {
    _chicken: Arc<Chicken>,
}

impl Component for Chicken {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(Chicken {
            _egg: container.get()?,
        })
    }
}

impl Component for Egg {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(Egg {
            _chicken: container.get()?,
        })
    }
}

#[test]
fn eager_cycles_are_not_ready() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<Chicken>(&profiles());
    registry.declare::<Egg>(&profiles());
    let container = container_with(&registry)?;

    for _ in 0..2 {
        let err = container.get::<Chicken>().map(|_| ()).unwrap_err();
        assert!(matches!(err, WiringError::NotReady { .. }), "{}", err);
        assert!(err.to_string().contains("Chicken"));
    }
    Ok(())
}

static FLAKY_FAILED: AtomicBool = AtomicBool::new(false);

struct Flaky;

impl Component for Flaky {
    fn construct(_container: &Container) -> Result<Self, WiringError> {
        if !FLAKY_FAILED.swap(true, Ordering::SeqCst) {
            return Err(WiringError::component::<Flaky>("first attempt fails"));
        }
        Ok(Flaky)
    }
}

#[test]
fn failed_constructions_release_the_building_mark() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<Flaky>(&profiles());
    let container = container_with(&registry)?;

    let err = container.get::<Flaky>().map(|_| ()).unwrap_err();
    assert!(matches!(err, WiringError::Component { .. }));
    container.get::<Flaky>()?;
    Ok(())
}

struct Scheduler {
    clock: Arc<Clock>,
}

impl Component for Scheduler {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(Scheduler {
            clock: container.get()?,
        })
    }
}

#[test]
fn auto_registration_is_opt_in() -> Result<(), WiringError> {
    let registry = Registry::new();

    let strict = container_with(&registry)?;
    assert!(matches!(
        strict.get::<Clock>().map(|_| ()),
        Err(WiringError::NoProvider { .. })
    ));

    let lenient = Container::builder()
        .registry(&registry)
        .value_source(MapValueSource::new())
        .auto_register(true)
        .build()?;
    let scheduler = lenient.get::<Scheduler>()?;
    assert!(Arc::ptr_eq(&scheduler.clock, &lenient.get::<Clock>()?));
    assert!(Arc::ptr_eq(&scheduler, &lenient.get::<Scheduler>()?));

    // qualified and untyped requests never register anything
    assert!(lenient.get_qualified::<Ticket>(&["special"]).is_err());
    assert!(lenient.resolve(&Token::of::<Ticket>(), &[]).is_err());
    assert_eq!(lenient.providers().len(), 2);
    Ok(())
}

#[test]
fn factories_receive_the_container() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.declare::<PrefixLogger>(&profiles());
    registry.register(
        Provider::factory("banner", |c: &Container| {
            let logger = c.get_dyn::<dyn Logger>()?;
            Ok(logger.log("banner"))
        })
        .with_scope(Scope::Prototype),
    );
    let container = container_with(&registry)?;

    let b1 = container.get_named::<String>("banner")?;
    let b2 = container.get_named::<String>("banner")?;
    assert_eq!(*b1, "[log] banner");
    assert!(!Arc::ptr_eq(&b1, &b2));
    Ok(())
}

#[test]
fn mismatched_types_are_reported() -> Result<(), WiringError> {
    let registry = Registry::new();
    registry.register(Provider::value("port", 80u16));
    let container = container_with(&registry)?;
    assert!(matches!(
        container.get_named::<String>("port"),
        Err(WiringError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn builders_reject_ambiguous_providers() {
    let err = Provider::builder("empty").build().unwrap_err();
    assert!(matches!(err, WiringError::InvalidProvider { .. }));

    let err = Provider::builder("both")
        .use_value(1u8)
        .use_factory(|_: &Container| Ok(2u8))
        .build()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"Invalid provider for "both": more than one of class, value or factory"#
    );

    let provider = Provider::builder(Token::of::<Clock>())
        .use_class::<Clock>()
        .qualifier("wall")
        .name("wallClock")
        .build()
        .unwrap();
    assert_eq!(provider.name(), Some("wallClock"));
    assert!(provider.qualifiers().contains("wall"));
}

#[test]
#[serial]
fn global_registry_feeds_default_containers() -> Result<(), WiringError> {
    Registry::global().clear();
    Registry::global().register(Provider::instance(7u8));
    Registry::global().declare::<Clock>(&profiles());
    Registry::global().declare::<Ticket>(&profiles());
    let container = Container::new()?;
    assert_eq!(*container.get_by_type::<u8>()?, 7);
    assert!(Arc::ptr_eq(&container.get::<Clock>()?, &container.get::<Clock>()?));
    assert!(!Arc::ptr_eq(&container.get::<Ticket>()?, &container.get::<Ticket>()?));

    Registry::global().clear();
    let empty = Container::new()?;
    assert!(empty.get_by_type::<u8>().is_err());
    Ok(())
}
