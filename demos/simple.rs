use std::{sync::Arc, time::SystemTime};

use sprout::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self) -> String;
}

struct LoggerImpl {
    prefix: String,
}

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}{}", self.prefix, content);
    }
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) -> String {
        let seconds = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|now| now.as_secs())
            .unwrap_or_default();
        let message = format!("{}s since epoch", seconds);
        self.logger.log(&message);
        message
    }
}

// Describe how the container builds them

impl Component for LoggerImpl {
    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(LoggerImpl {
            prefix: String::new(),
        })
    }

    fn inject_values(&mut self, values: &Values<'_>) -> Result<(), WiringError> {
        self.prefix = values.get("logger.prefix").unwrap_or_default();
        Ok(())
    }

    fn supertypes() -> Vec<Supertype<Self>> {
        vec![Supertype::of::<dyn Logger>(|c| c as Arc<dyn Logger>)]
    }
}

impl Component for DateLoggerImpl {
    const STEREOTYPE: Stereotype = Stereotype::Service;

    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(DateLoggerImpl {
            logger: container.get_dyn()?,
        })
    }

    fn supertypes() -> Vec<Supertype<Self>> {
        vec![Supertype::of::<dyn DateLogger>(|c| c as Arc<dyn DateLogger>)]
    }
}

// A configuration class producing a named bean

#[derive(Default)]
struct ClockConfig;

impl Component for ClockConfig {
    const STEREOTYPE: Stereotype = Stereotype::Configuration;

    fn construct(_container: &Container) -> Result<Self, WiringError> {
        Ok(ClockConfig)
    }

    fn beans() -> Vec<BeanMethod<Self>> {
        vec![BeanMethod::new("startedAt", |_: &ClockConfig, _: &Container| {
            Ok(SystemTime::now())
        })]
    }
}

// A controller exposing the date logger

struct DateController {
    dates: Arc<dyn DateLogger>,
}

impl Component for DateController {
    fn construct(container: &Container) -> Result<Self, WiringError> {
        Ok(DateController {
            dates: container.get_dyn()?,
        })
    }
}

impl Controller for DateController {
    const BASE_PATH: &'static str = "/date";

    fn routes() -> Vec<Route<Self>> {
        vec![Route::get("/", |c: &Self, _| Response::ok(c.dates.log_date()))]
    }
}

/// Registration module
struct LogModule;

impl Module for LogModule {
    fn register(&self, registry: &Registry, profiles: &ActiveProfiles) {
        registry.declare::<LoggerImpl>(profiles);
        registry.declare::<DateLoggerImpl>(profiles);
        registry.declare::<ClockConfig>(profiles);
        registry.declare_controller::<DateController>(profiles);
    }
}

fn main() -> Result<(), BootError> {
    init_tracing("sprout=info");

    let context = Application::builder()
        .config_dir("demos/config")
        .module(LogModule)
        .build()
        .run()?;

    let b: Arc<dyn DateLogger> = context.container.get_dyn()?;
    b.log_date();

    let started = context.container.get_named::<SystemTime>("startedAt")?;
    println!("started at {:?}", started);

    let response = context.router().dispatch(&Request::new(Method::Get, "/date"));
    println!("GET /date -> {} {}", response.status(), response.body());

    Ok(())
}
