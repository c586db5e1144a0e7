use std::{process, sync::Arc};

use roster::{
    application::{
        admin::{
            users::{AdminUserService, CreateUserCommand, UserInput},
            users_list::{UserListController, UserListDeps, UserPage},
        },
        error::AppError,
        notify::{LogNotifier, Notifier},
        repos::{PreferenceStore, UsersRepo},
        settings::SettingsService,
    },
    cache::{CacheConfig, QueryClient},
    config::{self, Command, ListArgs, SetArgs, SettingsCommand, UsersCommand},
    domain::{
        settings::SettingsPatch,
        types::{StatusFilter, UserRole, UserStatus},
    },
    infra::{
        error::InfraError,
        memory::InMemoryUsersRepo,
        preferences::{InMemoryPreferenceStore, JsonFilePreferenceStore},
        telemetry,
    },
    presentation::{settings::render_settings, users::render_user_list},
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(
            error = %error,
            chain = ?error.chain(),
            summary = error.presentation_message(),
            "application error"
        );
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let context = AppContext::build(&settings);
    let sweeper = spawn_cache_sweeper(context.client.clone(), &settings.cache);
    context.settings.load()?;

    let result = match cli_args.command.unwrap_or(Command::Demo) {
        Command::Users(args) => match args.command {
            UsersCommand::List(list) => run_users_list(&context, list).await,
            UsersCommand::Create(create) => {
                run_users_create(
                    &context,
                    CreateUserCommand {
                        name: create.name,
                        email: create.email,
                        role: create.role,
                        status: create.status,
                    },
                )
                .await
            }
            UsersCommand::Delete(delete) => run_users_delete(&context, &delete.email).await,
        },
        Command::Settings(args) => match args.command {
            SettingsCommand::Show => {
                println!("{}", render_settings(&context.settings.current()));
                Ok(())
            }
            SettingsCommand::Set(set) => run_settings_set(&context, set),
        },
        Command::Demo => run_demo(&context).await,
    };

    sweeper.abort();
    result
}

struct AppContext {
    client: QueryClient<UserPage>,
    service: AdminUserService,
    notifier: Arc<dyn Notifier>,
    settings: SettingsService,
    search_debounce: std::time::Duration,
}

impl AppContext {
    fn build(settings: &config::Settings) -> Self {
        let backend = if settings.backend.seed {
            InMemoryUsersRepo::seeded()
        } else {
            InMemoryUsersRepo::empty()
        };
        let repo: Arc<dyn UsersRepo> = Arc::new(
            backend.with_latency(settings.backend.read_latency, settings.backend.write_latency),
        );

        let store: Arc<dyn PreferenceStore> = match settings.preferences.path.as_ref() {
            Some(path) => Arc::new(JsonFilePreferenceStore::new(path.clone())),
            None => Arc::new(InMemoryPreferenceStore::new()),
        };
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        Self {
            client: QueryClient::new(CacheConfig::from(&settings.cache)),
            service: AdminUserService::new(repo),
            settings: SettingsService::new(store, Arc::clone(&notifier)),
            notifier,
            search_debounce: settings.users.search_debounce,
        }
    }

    fn controller(&self, page_size: Option<u32>) -> UserListController {
        UserListController::new(UserListDeps {
            client: self.client.clone(),
            service: self.service.clone(),
            notifier: Arc::clone(&self.notifier),
            page_size: page_size.unwrap_or_else(|| self.settings.current().items_per_page),
            search_debounce: self.search_debounce,
        })
    }
}

fn spawn_cache_sweeper(client: QueryClient<UserPage>, cache: &config::CacheSettings) -> JoinHandle<()> {
    let cadence = cache.gc_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cadence);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = client.collect_garbage();
            if !evicted.is_empty() {
                debug!(evicted = evicted.len(), "Cache sweep evicted entries");
            }
        }
    })
}

async fn run_users_list(context: &AppContext, args: ListArgs) -> Result<(), AppError> {
    let mut controller = context.controller(args.page_size);
    if let Some(search) = args.search {
        controller.set_search(search);
        controller.flush_search();
    }
    controller.set_status_filter(args.status.unwrap_or(StatusFilter::All));
    controller.set_page(args.page);

    let view = controller.settle().await;
    println!("{}", render_user_list(&view));
    Ok(())
}

async fn run_users_create(context: &AppContext, command: CreateUserCommand) -> Result<(), AppError> {
    let mut controller = context.controller(None);
    controller.open_create();
    let created = controller.submit(UserInput::Create(command)).await?;
    info!(user_id = %created.id, email = %created.email, "Created user");

    let view = controller.settle().await;
    println!("{}", render_user_list(&view));
    Ok(())
}

async fn run_users_delete(context: &AppContext, email: &str) -> Result<(), AppError> {
    let user = context.service.find_by_email(email).await?;
    let mut controller = context.controller(None);
    controller.request_delete(user);
    controller.confirm_delete().await?;

    let view = controller.settle().await;
    println!("{}", render_user_list(&view));
    Ok(())
}

fn run_settings_set(context: &AppContext, args: SetArgs) -> Result<(), AppError> {
    let patch = SettingsPatch {
        user_name: args.user_name,
        user_email: args.user_email,
        theme: args.theme,
        table_density: args.table_density,
        items_per_page: args.items_per_page,
    };
    if patch.is_empty() {
        return Err(AppError::validation("no settings were given"));
    }

    context.settings.update(&patch)?;
    let saved = context.settings.save()?;
    println!("{}", render_settings(&saved));
    Ok(())
}

/// Scripted tour of the list: paging, searching, creating and deleting.
async fn run_demo(context: &AppContext) -> Result<(), AppError> {
    let mut controller = context.controller(Some(5));

    println!("== First page");
    println!("{}", render_user_list(&controller.settle().await));

    controller.next_page();
    println!("\n== Second page");
    println!("{}", render_user_list(&controller.settle().await));

    controller.set_search("ana");
    println!("\n== Search \"ana\" (page resets to 1)");
    println!("{}", render_user_list(&controller.settle().await));

    controller.set_search("");
    controller.open_create();
    let created = controller
        .submit(UserInput::Create(CreateUserCommand {
            name: "Paula Nunes".to_string(),
            email: "paula.n@corp.com".to_string(),
            role: UserRole::User,
            status: UserStatus::Active,
        }))
        .await?;
    println!("\n== After creating {}", created.name);
    println!("{}", render_user_list(&controller.settle().await));

    controller.request_delete(created);
    controller.confirm_delete().await?;
    println!("\n== After deleting it again");
    println!("{}", render_user_list(&controller.settle().await));

    Ok(())
}
