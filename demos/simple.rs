use std::{sync::Arc, time::SystemTime};

use izoka::*;
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

struct LoggerImpl {
    prefix: Arc<String>,
}

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{} {}", self.prefix, content);
    }
}

struct DateLoggerImpl {
    logger: Arc<Arc<dyn Logger>>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.logger.log(&format!("{}s since epoch", secs));
    }
}

// Declare the tokens of our injected trait objects

static PREFIX: Lazy<Token<String>> = Lazy::new(|| Token::unique("prefix"));
static LOGGER: Lazy<Token<Arc<dyn Logger>>> = Lazy::new(|| Token::unique("Logger"));
static DATE_LOGGER: Lazy<Token<Arc<dyn DateLogger>>> = Lazy::new(|| Token::unique("DateLogger"));

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), WiringError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    Injectable::new(|args| {
        Ok(LoggerImpl {
            prefix: args.one(0)?,
        })
    })
    .inject(0, &*PREFIX)
    .provides_as(&*LOGGER, |l| Arc::new(l) as Arc<dyn Logger>)
    .register()?;

    Injectable::new(|args| {
        Ok(DateLoggerImpl {
            logger: args.one(0)?,
        })
    })
    .inject(0, &*LOGGER)
    .provides_as(&*DATE_LOGGER, |l| Arc::new(l) as Arc<dyn DateLogger>)
    .register()?;

    // The log module keeps its prefix private and only exports the logger
    let log_module = Module::builder()
        .provide(value_provider(&*PREFIX, "[demo]".to_string()))
        .provide(Class::of::<LoggerImpl>())
        .export(&*LOGGER)
        .build()?;

    let app = Module::builder()
        .import(&log_module)
        .provide(Class::of::<DateLoggerImpl>())
        .build()?;

    let b: Arc<Arc<dyn DateLogger>> = app.get(&*DATE_LOGGER).await?;
    b.log_date();

    Ok(())
}
