use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use mongodb::Client;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fairsplit::config::Config;
use fairsplit::handlers;
use fairsplit::notify::{ChangeNotifier, LogNotifier};
use fairsplit::store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load();
    info!(uri = %config.mongodb_uri, database = %config.database, "connecting to MongoDB");
    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .expect("failed to connect to MongoDB");
    info!("connected");

    if config.bot_token.is_none() {
        warn!("FAIRSPLIT_BOT_TOKEN is not set, requests will not be authenticated");
    }

    let store = Store::new(&client, &config.database);
    store
        .ensure_indexes()
        .await
        .expect("failed to create MongoDB indexes");
    let store = web::Data::new(store);
    let notifier: Arc<dyn ChangeNotifier> = Arc::new(LogNotifier);
    let notifier = web::Data::from(notifier);
    let bind_addr = config.bind_addr.clone();
    let allowed_origin = config.allowed_origin.clone();
    let config = web::Data::new(config);

    info!(addr = %bind_addr, "starting server");
    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .wrap(cors)
            .app_data(store.clone())
            .app_data(notifier.clone())
            .app_data(config.clone())
            .service(handlers::add_group)
            .service(handlers::get_group)
            .service(handlers::add_member)
            .service(handlers::add_expense)
            .service(handlers::update_expense)
            .service(handlers::delete_expense)
            .service(handlers::add_settlement)
            .service(handlers::delete_settlement)
            .service(handlers::get_balance)
    })
    .bind(bind_addr.as_str())?
    .run()
    .await
}
