//! Model shop console.
//!
//! Drives the storefront backend from a terminal: customers browse, fill a
//! cart, place pre-orders and chat with support; staff work orders, tracking,
//! moderation and the support desk. The signed-in user is kept in a session
//! file between runs.

mod render;
mod session_file;

use std::collections::HashSet;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use modelshop_client::chat::{AdminChatDesk, ChatBinding, ChatTab, CustomerChat, SendOutcome};
use modelshop_client::storefront::{NewCartLine, PreorderRequest};
use modelshop_client::{ApiClient, AppContext, AutoConfirm, ClientConfig, Confirmer, OrderDesk};
use modelshop_common::auth::{self, Access};
use modelshop_common::cart::CartKind;
use modelshop_common::chat::{MessageId, MessageLog, SessionId};
use modelshop_common::currency::Currency;
use modelshop_common::identity::EmployeeDraft;
use modelshop_common::order::{OrderAction, OrderId, TrackingDraft, TrackingId};
use modelshop_common::product::{categories, CatalogQuery, ProductId, ReviewDraft, ReviewStatus, SortOrder};

use crate::render::Prices;

#[derive(Parser)]
#[command(name = "modelshop-console", about = "Model shop storefront and back-office console")]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "MODELSHOP_API_URL")]
    api_url: Option<String>,

    /// Exchange rate lookup URL.
    #[arg(long, env = "MODELSHOP_RATES_URL")]
    rates_url: Option<String>,

    /// Where the signed-in user is remembered.
    #[arg(long, env = "MODELSHOP_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Display currency (PHP, USD, EUR).
    #[arg(long, default_value = "PHP")]
    currency: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the token.
    Login {
        username: String,
        #[arg(long, env = "MODELSHOP_PASSWORD")]
        password: String,
    },
    Logout,
    Whoami,
    /// Browse the catalogue.
    Catalog {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Minimum price in centavos.
        #[arg(long)]
        min_price: Option<u64>,
        /// Maximum price in centavos.
        #[arg(long)]
        max_price: Option<u64>,
        #[arg(long)]
        in_stock: bool,
        /// newest, price-asc, price-desc, name or rating.
        #[arg(long, default_value = "newest")]
        sort: SortOrder,
    },
    /// One product with its variants and reviews.
    Product { id: String },
    /// Review a product (1 to 5 stars).
    Review {
        product: String,
        #[arg(long)]
        rating: u8,
        #[arg(long, default_value = "")]
        comment: String,
    },
    #[command(subcommand)]
    Cart(CartCommand),
    /// Turn the whole cart into a pre-order.
    Preorder {
        #[arg(long)]
        address: String,
        #[arg(long)]
        phone: String,
    },
    /// Your orders, or every order with --all (staff).
    Orders {
        #[arg(long)]
        all: bool,
        #[arg(long, requires = "all")]
        status: Option<String>,
    },
    /// Order detail, timeline and available actions.
    Order { id: String },
    /// Move an order along its workflow.
    Act {
        id: String,
        action: ActionArg,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    #[command(subcommand)]
    Tracking(TrackingCommand),
    #[command(subcommand)]
    Chat(ChatCommand),
    /// Support desk (staff).
    #[command(subcommand)]
    Desk(DeskCommand),
    /// Review moderation (staff).
    #[command(subcommand)]
    Reviews(ReviewsCommand),
    #[command(subcommand)]
    Employees(EmployeesCommand),
    Customers,
    /// Set a product's stock level.
    Stock { product: String, stock: u32 },
}

#[derive(Subcommand)]
enum CartCommand {
    Show,
    Add {
        product: String,
        #[arg(long)]
        variant: Option<String>,
        #[arg(long, default_value_t = 1)]
        quantity: i64,
        /// Add as a requested custom variant.
        #[arg(long)]
        requested: bool,
    },
    /// Set a line's quantity. Out-of-range input is clamped.
    Set { line: String, quantity: String },
    Remove { line: String },
}

#[derive(Subcommand)]
enum TrackingCommand {
    Add {
        order: String,
        #[arg(long)]
        status: String,
        #[arg(long)]
        location: String,
    },
    Edit {
        order: String,
        tracking: String,
        #[arg(long)]
        status: String,
        #[arg(long)]
        location: String,
    },
    Remove {
        order: String,
        tracking: String,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ChatCommand {
    /// Send one message to support.
    Send { text: String },
    /// Follow the conversation until interrupted.
    Watch,
    /// Forget the current conversation.
    Reset,
}

#[derive(Subcommand)]
enum DeskCommand {
    Sessions,
    Watch { session: String },
    Reply { session: String, text: String },
    Close { session: String },
}

#[derive(Subcommand)]
enum ReviewsCommand {
    Pending,
    Approve { id: String },
    Reject { id: String },
}

#[derive(Subcommand)]
enum EmployeesCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: String,
        #[arg(long = "permission")]
        permissions: Vec<String>,
        #[arg(long, env = "MODELSHOP_EMPLOYEE_PASSWORD")]
        password: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long = "permission")]
        permissions: Option<Vec<String>>,
        #[arg(long)]
        password: Option<String>,
    },
    Remove { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Verify,
    Cancel,
    StartShipping,
    FinishShipping,
    ConfirmReceipt,
}

impl From<ActionArg> for OrderAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Verify => OrderAction::Verify,
            ActionArg::Cancel => OrderAction::Cancel,
            ActionArg::StartShipping => OrderAction::StartShipping,
            ActionArg::FinishShipping => OrderAction::FinishShipping,
            ActionArg::ConfirmReceipt => OrderAction::ConfirmReceipt,
        }
    }
}

/// Asks on the terminal.
struct Prompt;

impl Confirmer for Prompt {
    fn confirm(&self, action: OrderAction, order: &OrderId) -> bool {
        print!("{} (order {order}) [y/N] ", action.confirmation_prompt());
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

fn confirmer(yes: bool) -> &'static dyn Confirmer {
    if yes {
        &AutoConfirm
    } else {
        &Prompt
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.api_url.clone() {
        config.api_url = url;
    }
    if cli.rates_url.is_some() {
        config.rates_url = cli.rates_url.clone();
    }

    let session_path = cli.session_file.clone().unwrap_or_else(session_file::default_path);
    let stored = session_file::load(&session_path);
    let ctx = AppContext::new(stored.user);
    ctx.set_chat_session(stored.chat_session);

    let api = ApiClient::new(config, ctx.clone())?;
    let result = run(&cli, &api).await;

    // Persist whatever the command left behind, including a sign-out on failure.
    session_file::save(
        &session_path,
        &session_file::Stored {
            user: ctx.user(),
            chat_session: ctx.chat_session(),
        },
    )?;
    result
}

/// Refuse staff commands the current token does not allow.
fn authorize(api: &ApiClient, route: &str) -> anyhow::Result<()> {
    let Some(requirement) = auth::requirement_for(route) else {
        return Ok(());
    };
    match api.context().guard(requirement, Utc::now()) {
        Access::Granted(claims) => {
            tracing::debug!(user = ?claims.username, route, "Access granted");
            Ok(())
        }
        Access::RedirectLogin { clear_token } => {
            if clear_token {
                bail!("your session has expired; run `modelshop-console login` again")
            }
            bail!("please log in first")
        }
        Access::Unauthorized => bail!("your account is not allowed to use {route}"),
    }
}

async fn prices(cli: &Cli, api: &ApiClient) -> anyhow::Result<Prices> {
    let currency =
        Currency::from_code(&cli.currency).with_context(|| format!("unknown currency {}", cli.currency))?;
    if currency == Currency::default() {
        return Ok(Prices::base());
    }
    let rates = match api.exchange_rates().await {
        Ok(rates) => rates,
        Err(e) => {
            tracing::warn!("Exchange rates unavailable, showing base prices: {e}");
            Default::default()
        }
    };
    Ok(Prices { currency, rates })
}

async fn run(cli: &Cli, api: &ApiClient) -> anyhow::Result<()> {
    match &cli.command {
        Command::Login { username, password } => {
            let session = api.login(username, password).await?;
            println!("Signed in as {} ({})", session.username, session.user_id);
        }
        Command::Logout => {
            api.logout();
            println!("Signed out");
        }
        Command::Whoami => match (api.context().user(), api.context().claims()) {
            (Some(user), Some(claims)) => {
                let expiry = if claims.is_expired(Utc::now()) { " (expired)" } else { "" };
                println!("{} ({}) role={}{expiry}", user.username, user.user_id, claims.role);
                if !claims.permissions.is_empty() {
                    println!("permissions: {}", claims.permissions.join(", "));
                }
            }
            (Some(user), None) => println!("{} ({})", user.username, user.user_id),
            (None, _) => println!("Not signed in"),
        },
        Command::Catalog {
            category,
            search,
            min_price,
            max_price,
            in_stock,
            sort,
        } => {
            let prices = prices(cli, api).await?;
            let products = api.products().await?;
            let query = CatalogQuery {
                category: category.clone(),
                search: search.clone(),
                min_price: *min_price,
                max_price: *max_price,
                in_stock_only: *in_stock,
                sort: *sort,
            };
            let shown = query.apply(&products);
            println!("Categories: {}", categories(&products).join(", "));
            for p in &shown {
                println!("{}", render::product_line(p, &prices));
            }
            println!("{} of {} products", shown.len(), products.len());
        }
        Command::Product { id } => {
            let prices = prices(cli, api).await?;
            let id = ProductId(id.clone());
            let (product, variants, reviews) =
                tokio::try_join!(api.product(&id), api.variants(&id), api.reviews(&id))?;
            println!("{}", render::product_line(&product, &prices));
            if !product.description.is_empty() {
                println!("  {}", product.description);
            }
            if let Some(url) = product.model_url.as_deref().filter(|_| product.has_model_preview()) {
                println!("  3D preview: {url}");
            }
            for v in &variants {
                println!("  variant {} {} {}", v.id, v.name, prices.show(v.price));
            }
            for r in reviews.iter().filter(|r| r.status == ReviewStatus::Approved) {
                println!("  {}", render::review_line(r));
            }
        }
        Command::Review {
            product,
            rating,
            comment,
        } => {
            let draft = ReviewDraft::new(*rating, comment.clone())
                .context("rating must be between 1 and 5")?;
            api.submit_review(&ProductId(product.clone()), &draft).await?;
            println!("Review submitted for moderation");
        }
        Command::Cart(cmd) => cart(cli, api, cmd).await?,
        Command::Preorder { address, phone } => {
            let user_id = api.context().user_id().context("please log in first")?;
            let cart = api.cart().await?;
            let request = PreorderRequest {
                user_id,
                cart_line_ids: cart.lines.iter().map(|l| l.id.clone()).collect(),
                shipping_address: address.clone(),
                phone: phone.clone(),
            };
            let order = api.place_preorder(&request).await?;
            println!("Pre-order {} placed", order.id);
        }
        Command::Orders { all, status } => {
            let prices = prices(cli, api).await?;
            let orders = if *all {
                authorize(api, "/admin/orders")?;
                api.all_orders(status.as_deref()).await?
            } else {
                api.my_orders().await?
            };
            for o in &orders {
                println!("{}", render::order_line(o, &prices));
            }
        }
        Command::Order { id } => {
            let prices = prices(cli, api).await?;
            let mut desk = OrderDesk::new(api.clone(), OrderId(id.clone()));
            desk.load().await?;
            let actions = desk.actions();
            if let Some(detail) = desk.detail() {
                println!(
                    "{}",
                    render::order_detail(&detail.order, &detail.tracking, &actions, &prices)
                );
            }
        }
        Command::Act { id, action, yes } => {
            let action = OrderAction::from(*action);
            if action != OrderAction::ConfirmReceipt {
                authorize(api, "/admin/orders")?;
            }
            let mut desk = OrderDesk::new(api.clone(), OrderId(id.clone()));
            desk.load().await?;
            let status = desk.perform(action, confirmer(*yes)).await?;
            println!("Order {id} is now {status}");
        }
        Command::Tracking(cmd) => {
            authorize(api, "/admin/orders")?;
            tracking(api, cmd).await?;
        }
        Command::Chat(cmd) => chat(api, cmd).await?,
        Command::Desk(cmd) => {
            authorize(api, "/admin/chat")?;
            desk(api, cmd).await?;
        }
        Command::Reviews(cmd) => {
            authorize(api, "/admin/reviews")?;
            match cmd {
                ReviewsCommand::Pending => {
                    for r in api.reviews_for_moderation(ReviewStatus::Pending).await? {
                        println!("{} [{}] {}", r.id, r.product_id, render::review_line(&r));
                    }
                }
                ReviewsCommand::Approve { id } => {
                    api.moderate_review(id, ReviewStatus::Approved).await?;
                    println!("Review {id} approved");
                }
                ReviewsCommand::Reject { id } => {
                    api.moderate_review(id, ReviewStatus::Rejected).await?;
                    println!("Review {id} rejected");
                }
            }
        }
        Command::Employees(cmd) => {
            authorize(api, "/admin/employees")?;
            employees(api, cmd).await?;
        }
        Command::Customers => {
            authorize(api, "/admin/customers")?;
            for c in api.customers().await? {
                println!("{:<10} {:<20} {}", c.id, c.username, c.email);
            }
        }
        Command::Stock { product, stock } => {
            authorize(api, "/admin/inventory")?;
            api.update_stock(&ProductId(product.clone()), *stock).await?;
            println!("Stock of {product} set to {stock}");
        }
    }
    Ok(())
}

async fn cart(cli: &Cli, api: &ApiClient, cmd: &CartCommand) -> anyhow::Result<()> {
    match cmd {
        CartCommand::Show => {
            let prices = prices(cli, api).await?;
            let cart = api.cart().await?;
            for line in &cart.lines {
                println!(
                    "{:<8} {:<28} x{:<3} {}",
                    line.id,
                    line.product_name,
                    line.quantity(),
                    prices.show(line.subtotal())
                );
            }
            println!("{} items, total {}", cart.item_count(), prices.show(cart.total()));
        }
        CartCommand::Add {
            product,
            variant,
            quantity,
            requested,
        } => {
            let kind = if *requested {
                CartKind::RequestedVariant
            } else {
                CartKind::Product
            };
            let line = NewCartLine::new(ProductId(product.clone()), variant.clone(), kind, *quantity);
            if i64::from(line.quantity) != *quantity {
                println!("Quantity adjusted to {}", line.quantity);
            }
            api.add_to_cart(&line).await?;
            println!("Added {product} x{}", line.quantity);
        }
        CartCommand::Set { line, quantity } => {
            let mut cart = api.cart().await?;
            let entry = cart
                .line_mut(line)
                .with_context(|| format!("no cart line {line}"))?;
            let stored = entry.set_from_input(quantity);
            api.update_cart_line(entry).await?;
            println!("Line {line} quantity {stored}");
        }
        CartCommand::Remove { line } => {
            api.remove_cart_line(line).await?;
            println!("Removed line {line}");
        }
    }
    Ok(())
}

async fn tracking(api: &ApiClient, cmd: &TrackingCommand) -> anyhow::Result<()> {
    let order = match cmd {
        TrackingCommand::Add { order, .. }
        | TrackingCommand::Edit { order, .. }
        | TrackingCommand::Remove { order, .. } => OrderId(order.clone()),
    };
    let mut desk = OrderDesk::new(api.clone(), order);
    desk.load().await?;
    match cmd {
        TrackingCommand::Add {
            status, location, ..
        } => {
            let draft = TrackingDraft {
                status: status.clone(),
                location: location.clone(),
            };
            desk.add_tracking(&draft).await?;
        }
        TrackingCommand::Edit {
            tracking,
            status,
            location,
            ..
        } => {
            let draft = TrackingDraft {
                status: status.clone(),
                location: location.clone(),
            };
            desk.edit_tracking(&TrackingId(tracking.clone()), &draft).await?;
        }
        TrackingCommand::Remove { tracking, yes, .. } => {
            desk.delete_tracking(&TrackingId(tracking.clone()), confirmer(*yes))
                .await?;
        }
    }
    if let Some(detail) = desk.detail() {
        println!("{} tracking updates", detail.tracking.len());
        if let Some(latest) = detail.tracking.latest() {
            println!("Latest: {} @ {}", latest.status, latest.location);
        }
    }
    Ok(())
}

/// Print messages not printed yet.
fn print_new(log: &MessageLog, seen: &mut HashSet<MessageId>) {
    for m in log.messages() {
        if seen.insert(m.id.clone()) {
            println!("{}", render::chat_line(m));
        }
    }
}

async fn chat(api: &ApiClient, cmd: &ChatCommand) -> anyhow::Result<()> {
    let ctx = api.context();
    let binding = ChatBinding {
        session_id: ctx.chat_session(),
        user_id: ctx.user_id(),
        tab: ChatTab::Chat,
    };
    match cmd {
        ChatCommand::Send { text } => {
            let widget = CustomerChat::new(api.clone());
            widget.bind(binding);
            let timings = api.config().chat;
            let outcome = widget.send(text).await;
            let wait = match &outcome {
                SendOutcome::Empty => bail!("nothing to send"),
                SendOutcome::Delivered { session_id } => {
                    tracing::debug!(%session_id, "Message delivered");
                    timings.refetch_delay
                }
                SendOutcome::Replied => Duration::ZERO,
                SendOutcome::Anonymous => timings.placeholder_delay,
                SendOutcome::Failed { reason } => {
                    eprintln!("Not delivered: {reason}");
                    timings.apology_delay
                }
            };
            tokio::time::sleep(wait + Duration::from_millis(300)).await;
            let mut seen = HashSet::new();
            print_new(&widget.snapshot().log, &mut seen);
        }
        ChatCommand::Watch => {
            if binding.session_id.is_none() {
                bail!("no conversation yet; send a message first");
            }
            let widget = CustomerChat::new(api.clone());
            let mut rx = widget.subscribe();
            widget.bind(binding);
            let mut seen = HashSet::new();
            loop {
                print_new(&rx.borrow_and_update().log, &mut seen);
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            widget.shutdown();
        }
        ChatCommand::Reset => {
            ctx.set_chat_session(None);
            println!("Conversation forgotten");
        }
    }
    Ok(())
}

async fn desk(api: &ApiClient, cmd: &DeskCommand) -> anyhow::Result<()> {
    let desk = AdminChatDesk::new(api.clone());
    match cmd {
        DeskCommand::Sessions => {
            desk.refresh().await;
            let view = desk.snapshot();
            if let Some(message) = view.error_message {
                bail!(message);
            }
            if let Some(stats) = &view.stats {
                println!("{}", render::stats_line(stats));
            }
            for s in view.board.sessions() {
                println!("{}", render::session_line(s));
            }
        }
        DeskCommand::Watch { session } => {
            let mut rx = desk.subscribe();
            desk.start();
            desk.select(SessionId(session.clone()));
            let mut seen = HashSet::new();
            loop {
                print_new(&rx.borrow_and_update().log, &mut seen);
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            desk.shutdown();
        }
        DeskCommand::Reply { session, text } => {
            desk.select(SessionId(session.clone()));
            desk.reply(text).await?;
            println!("Reply sent");
        }
        DeskCommand::Close { session } => {
            desk.close_session(&SessionId(session.clone())).await?;
            println!("Session {session} closed");
        }
    }
    Ok(())
}

async fn employees(api: &ApiClient, cmd: &EmployeesCommand) -> anyhow::Result<()> {
    match cmd {
        EmployeesCommand::List => {
            for e in api.employees().await? {
                println!(
                    "{:<8} {:<20} {:<24} {:<8} {}",
                    e.id,
                    e.name,
                    e.email,
                    e.role,
                    e.permissions.join(",")
                );
            }
        }
        EmployeesCommand::Add {
            name,
            email,
            role,
            permissions,
            password,
        } => {
            let draft = EmployeeDraft {
                name: name.clone(),
                email: email.clone(),
                role: role.clone(),
                permissions: permissions.clone(),
                password: Some(password.clone()),
            };
            let created = api.create_employee(&draft).await?;
            println!("Employee {} created", created.id);
        }
        EmployeesCommand::Update {
            id,
            name,
            email,
            role,
            permissions,
            password,
        } => {
            let current = api
                .employees()
                .await?
                .into_iter()
                .find(|e| &e.id == id)
                .with_context(|| format!("no employee {id}"))?;
            let mut draft = EmployeeDraft::from(&current);
            if let Some(name) = name {
                draft.name = name.clone();
            }
            if let Some(email) = email {
                draft.email = email.clone();
            }
            if let Some(role) = role {
                draft.role = role.clone();
            }
            if let Some(permissions) = permissions {
                draft.permissions = permissions.clone();
            }
            draft.password = password.clone();
            api.update_employee(id, &draft).await?;
            println!("Employee {id} updated");
        }
        EmployeesCommand::Remove { id } => {
            api.delete_employee(id).await?;
            println!("Employee {id} removed");
        }
    }
    Ok(())
}
