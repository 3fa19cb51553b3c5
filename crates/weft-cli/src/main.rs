//! weft command-line front end.
//!
//! Usage:
//!   # Apply a sync response saved as JSON
//!   weft import sync.json
//!
//!   # Print a room's newest tiles
//!   weft show --room '!lobby:example.org' --limit 20 --user '@me:example.org'
//!
//!   # List known rooms
//!   weft rooms
//!
//! The database defaults to `$XDG_DATA_HOME/weft/weft.db`; `--db` or the
//! config file's `storage.path` override it. Logs go to stderr, filtered by
//! `RUST_LOG`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

use weft_observable::{ListObserver, ObservableList, UpdateParams};
use weft_store::Storage;
use weft_timeline::{NoHistory, Session, Tile, TileOptions, WeftConfig};
use weft_types::{RoomId, SyncResponse, UserId};

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(about = "Client-side room timelines over a local store")]
struct Args {
    /// RON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Persist and apply sync responses read from JSON files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the newest tiles of a room
    Show {
        #[arg(long)]
        room: String,

        /// Events to load from the end of the timeline
        #[arg(long)]
        limit: Option<usize>,

        /// Render this user's messages as own messages
        #[arg(long)]
        user: Option<String>,
    },
    /// List stored rooms
    Rooms,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let mut config = load_config(&args)?;
    if let Command::Show { limit: Some(limit), .. } = &args.command {
        config = config.with_initial_load(*limit);
    }

    // the timeline engine is !Send
    let local_set = tokio::task::LocalSet::new();
    local_set
        .run_until(async move {
            let storage = Storage::open(&config.storage).context("opening storage")?;
            let session = Session::new(storage, Rc::new(NoHistory), config.timeline.clone());
            session.load().await?;

            match args.command {
                Command::Import { files } => import(&session, &files).await,
                Command::Show { room, user, .. } => show(&session, room, user).await,
                Command::Rooms => {
                    rooms(&session);
                    Ok(())
                }
            }
        })
        .await
}

fn load_config(args: &Args) -> Result<WeftConfig> {
    let mut config = match &args.config {
        Some(path) => WeftConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => WeftConfig::default(),
    };
    if let Some(db) = &args.db {
        config = config.with_storage_path(db);
    }
    if config.storage.path.is_none() {
        let dir = dirs::data_local_dir()
            .context("no local data directory, pass --db")?
            .join("weft");
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        config = config.with_storage_path(dir.join("weft.db"));
    }
    debug!(?config, "resolved config");
    Ok(config)
}

async fn import(session: &Session, files: &[PathBuf]) -> Result<()> {
    for file in files {
        let sync = read_sync(file)?;
        let changes = session.persist_sync(&sync).await?;
        let entries: usize = changes.iter().map(|(_, c)| c.entries.len()).sum();
        info!(file = %file.display(), rooms = changes.len(), entries, "imported sync");
        session.emit_sync(changes);
    }
    Ok(())
}

fn read_sync(path: &Path) -> Result<SyncResponse> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding {}", path.display()))
}

async fn show(session: &Session, room_id: String, user: Option<String>) -> Result<()> {
    let room_id = RoomId::parse(&room_id)?;
    let own_user_id = user.as_deref().map(UserId::parse).transpose()?;
    let room = session
        .room(&room_id)
        .with_context(|| format!("unknown room {room_id}"))?;
    let timeline = room.open_timeline().await?;
    let tiles = timeline.tiles(TileOptions { own_user_id });
    let counter = Rc::new(RefCell::new(DeltaCounter::default()));
    let subscription = tiles.subscribe(counter.clone());

    println!("{}", room.summary().display_name());
    for view in tiles.views() {
        println!("{view}");
    }
    tiles.unsubscribe(subscription);
    timeline.close();
    debug!(deltas = counter.borrow().0, "tile deltas while shown");
    Ok(())
}

fn rooms(session: &Session) {
    for room in session.rooms() {
        let summary = room.summary();
        match summary.last_message() {
            Some(last) => println!("{}\t{}\t{last}", room.id(), summary.display_name()),
            None => println!("{}\t{}", room.id(), summary.display_name()),
        }
    }
}

/// Counts tile deltas; the tile list only stays live while observed.
#[derive(Default)]
struct DeltaCounter(usize);

impl ListObserver<Tile> for DeltaCounter {
    fn on_reset(&mut self, _items: &mut dyn Iterator<Item = &Tile>) {
        self.0 += 1;
    }

    fn on_add(&mut self, _index: usize, _item: &Tile) {
        self.0 += 1;
    }

    fn on_update(&mut self, _index: usize, _item: &Tile, _params: Option<&UpdateParams>) {
        self.0 += 1;
    }

    fn on_remove(&mut self, _index: usize, _item: &Tile) {
        self.0 += 1;
    }
}
