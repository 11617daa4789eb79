use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use calnotes::api::{ApiClient, LoginOutcome};
use calnotes::calendar::{group_by_day, Month, MonthGrid, MonthSummary, NoteFilter};
use calnotes::config::Config;
use calnotes::domain::{image_mime, ImageAttachment, Note, NoteDraft, Priority, RecordId};
use calnotes::journal;
use calnotes::logger;
use calnotes::notes::{NotesService, SaveOutcome};
use calnotes::reminder::ReminderSettings;
use calnotes::state::{SessionHandle, StateStore};
use calnotes::DateNormalizer;

#[derive(Parser)]
#[command(name = "calnotes")]
#[command(about = "Calendar notes with timezone-safe local dates")]
#[command(version)]
struct Cli {
    /// Timezone to treat as local (overrides CALNOTES_TZ)
    #[arg(long, global = true)]
    tz: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the local day key for any date-like input
    Key { input: Option<String> },

    /// Print today's day key
    Today,

    /// List notes, optionally filtered
    List {
        /// Case-insensitive title search
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// First day to include
        #[arg(long)]
        from: Option<String>,
        /// Last day to include
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Counts, recent and pinned notes for a month
    Summary {
        /// YYYY-MM (defaults to the current month)
        #[arg(short, long)]
        month: Option<Month>,
    },

    /// Month grid with the number of notes per day
    Grid {
        #[arg(short, long)]
        month: Option<Month>,
    },

    /// Add a note
    Add {
        title: String,
        /// Any date-like value; defaults to today
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long)]
        pinned: bool,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
        #[command(flatten)]
        reminder: ReminderArgs,
    },

    /// Edit a note
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// Move a note to another day
    Move { id: String, date: String },

    Pin { id: String },

    Unpin { id: String },

    Delete { id: String },

    /// Turn a note's reminder on or off
    Remind {
        id: String,
        #[command(flatten)]
        reminder: ReminderArgs,
        #[arg(long, conflicts_with_all = ["at", "offset", "email"])]
        off: bool,
    },

    /// Upload an image and attach it to a note
    Attach { id: String, path: PathBuf },

    Login {
        email: String,
        /// Falls back to CALNOTES_PASSWORD
        #[arg(long)]
        password: Option<String>,
        /// Move guest notes into the account after logging in
        #[arg(long)]
        migrate: bool,
    },

    Logout,

    /// Show the signed-in user
    Whoami,

    /// Move guest notes into the signed-in account
    Migrate,

    /// Write a markdown agenda
    Agenda {
        #[arg(short, long)]
        month: Option<Month>,
        /// Defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether the API is up
    Health,
}

#[derive(clap::Args)]
struct ReminderArgs {
    /// Local time of the reminder (HH:MM)
    #[arg(long)]
    at: Option<String>,
    /// Minutes before `--at` (30, 60, 1440, ...)
    #[arg(long)]
    offset: Option<u32>,
    /// Also send the reminder by email
    #[arg(long)]
    email: Option<String>,
}

impl ReminderArgs {
    fn is_empty(&self) -> bool {
        self.at.is_none() && self.offset.is_none() && self.email.is_none()
    }

    /// Unset fields fall back to the configured defaults.
    fn resolve(&self, cfg: &Config) -> Result<ReminderSettings> {
        let clock = self.at.as_deref().unwrap_or(&cfg.reminder_clock);
        let offset = self.offset.unwrap_or(cfg.reminder_offset_minutes);
        ReminderSettings::new(offset, clock, self.email.clone())
    }

    /// `None` when no reminder flag was given.
    fn settings(&self, cfg: &Config) -> Result<Option<ReminderSettings>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.resolve(cfg).map(Some)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut cfg = Config::from_env()?;
    if let Some(tz) = cli.tz.clone() {
        cfg.tz = tz;
        cfg.validate()?;
    }

    logger::init_tracing(cfg.log_json);
    info!(tz = %cfg.tz, api = %cfg.api_base_url, "boot");

    let normalizer = DateNormalizer::with_zone(cfg.zone()?);
    let session = SessionHandle::open(StateStore::new(&cfg.state_path))?;
    let api = ApiClient::new(&cfg, session)?;
    let svc = NotesService::new(api, normalizer);

    run(cli.command, &cfg, &svc).await
}

async fn run(command: Commands, cfg: &Config, svc: &NotesService) -> Result<()> {
    let norm = svc.normalizer();

    match command {
        Commands::Key { input } => println!("{}", norm.normalize_date_key(input.as_deref())),

        Commands::Today => println!("{}", norm.today()),

        Commands::List {
            query,
            priority,
            from,
            to,
            json,
        } => {
            let notes = svc.fetch().await?;
            let filter = NoteFilter {
                query,
                priority,
                from: from.as_deref().map(|d| norm.parse_local_date(d)),
                to: to.as_deref().map(|d| norm.parse_local_date(d)),
            };
            let shown: Vec<&Note> = filter.apply(&notes, norm);
            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                for note in shown {
                    print_note(note);
                }
            }
        }

        Commands::Summary { month } => {
            let month = month.unwrap_or_else(|| Month::of(norm.today()));
            let notes = svc.fetch().await?;
            let summary = MonthSummary::build(&notes, month, norm);
            println!("{month}: {} notes", summary.total());
            println!(
                "  normal {}  important {}  reminder {}",
                summary.counts.normal, summary.counts.important, summary.counts.reminder
            );
            if !summary.recent.is_empty() {
                println!("recent:");
                summary.recent.iter().for_each(|n| print_note(n));
            }
            if !summary.pinned.is_empty() {
                println!("pinned:");
                summary.pinned.iter().for_each(|n| print_note(n));
            }
        }

        Commands::Grid { month } => {
            let month = month.unwrap_or_else(|| Month::of(norm.today()));
            let notes = svc.fetch().await?;
            let groups = group_by_day(&notes, norm);
            let grid = MonthGrid::new(month);
            let today = norm.today();

            println!("{month}");
            println!(" Su  Mo  Tu  We  Th  Fr  Sa");
            for week in grid.weeks() {
                let row: Vec<String> = week
                    .iter()
                    .map(|day| {
                        if !month.contains(*day) {
                            return "    ".to_string();
                        }
                        let count = groups.get(&day.key()).map_or(0, Vec::len);
                        let mark = match (count, *day == today) {
                            (0, true) => "*".to_string(),
                            (0, false) => " ".to_string(),
                            (n, _) => n.min(9).to_string(),
                        };
                        format!("{:>3}{mark}", day.day())
                    })
                    .collect();
                println!("{}", row.join(""));
            }
        }

        Commands::Add {
            title,
            date,
            description,
            priority,
            pinned,
            image,
            reminder,
        } => {
            let draft = NoteDraft {
                title,
                description,
                priority,
                pinned,
                date,
                image: image.map(|p| ImageAttachment::from_path(p)).transpose()?,
                reminder: reminder.settings(cfg)?,
            };
            match svc.save(&draft, None, None).await? {
                SaveOutcome::Added { guest_prompt } => {
                    println!("added");
                    if guest_prompt {
                        println!(
                            "Saved 3 notes as a guest. Log in to keep them with your account."
                        );
                    }
                }
                SaveOutcome::Updated(_) => {}
            }
        }

        Commands::Edit {
            id,
            title,
            date,
            description,
            priority,
        } => {
            let note = svc.find(&RecordId::new(id)).await?;
            let mut draft = svc.edit_draft(&note)?;
            if let Some(title) = title {
                draft.title = title;
            }
            if date.is_some() {
                draft.date = date;
            }
            if description.is_some() {
                draft.description = description;
            }
            if priority.is_some() {
                draft.priority = priority;
            }
            if let SaveOutcome::Updated(updated) = svc.save(&draft, None, Some(&note)).await? {
                print_note(&updated);
            }
        }

        Commands::Move { id, date } => {
            let key = svc.move_to(&RecordId::new(id), date.as_str()).await?;
            println!("moved to {key}");
        }

        Commands::Pin { id } => svc.set_pinned(&RecordId::new(id), true).await?,

        Commands::Unpin { id } => svc.set_pinned(&RecordId::new(id), false).await?,

        Commands::Delete { id } => svc.remove(&RecordId::new(id)).await?,

        Commands::Remind { id, reminder, off } => {
            let note = svc.find(&RecordId::new(id)).await?;
            let settings = if off {
                None
            } else {
                Some(reminder.resolve(cfg)?)
            };
            match svc.set_reminder(&note, settings).await? {
                Some(schedule) => {
                    let fire_at = schedule.fire_at();
                    match norm.zone().to_local(fire_at) {
                        Some(local) => println!("reminder at {}", local.format("%Y-%m-%d %H:%M")),
                        None => println!("reminder at {}", fire_at.format("%Y-%m-%d %H:%M UTC")),
                    }
                }
                None => println!("reminder off"),
            }
        }

        Commands::Attach { id, path } => {
            let mime = image_mime(&path)?;
            let bytes = std::fs::read(&path)?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            let id = RecordId::new(id);
            let image = svc.api().upload_image(bytes, &name, mime, Some(&id)).await?;
            println!("attached {} ({} bytes)", image.mime, image.decode()?.len());
        }

        Commands::Login {
            email,
            password,
            migrate,
        } => {
            let password = password
                .or_else(|| std::env::var("CALNOTES_PASSWORD").ok())
                .ok_or_else(|| anyhow!("pass --password or set CALNOTES_PASSWORD"))?;
            match svc.login(&email, &password).await? {
                LoginOutcome::PasswordResetRequired => {
                    bail!("{email} must set a new password before logging in")
                }
                LoginOutcome::LoggedIn { user } => {
                    let name = user
                        .and_then(|u| u.display_name())
                        .unwrap_or_else(|| email.clone());
                    println!("logged in as {name}");
                }
            }
            if svc.should_offer_migration() {
                if migrate {
                    svc.migrate_guest_notes().await?;
                    println!("guest notes moved to your account");
                } else {
                    println!("You have guest notes. Run `calnotes migrate` to keep them.");
                }
            }
        }

        Commands::Logout => {
            svc.logout()?;
            println!("logged out");
        }

        Commands::Whoami => {
            if !svc.api().session().is_authenticated() {
                println!("guest");
            } else {
                let user = svc.api().current_user().await?;
                let name = user.display_name().unwrap_or_else(|| user.id.to_string());
                println!("{name} ({})", user.id);
            }
        }

        Commands::Migrate => {
            svc.migrate_guest_notes().await?;
            println!("guest notes moved to your account");
        }

        Commands::Agenda { month, output } => {
            let notes = svc.fetch().await?;
            let (title, notes) = match month {
                Some(m) => {
                    let range = NoteFilter {
                        from: Some(m.first_day()),
                        to: Some(m.last_day()),
                        ..NoteFilter::default()
                    };
                    let picked: Vec<Note> =
                        range.apply(&notes, norm).into_iter().cloned().collect();
                    (format!("Agenda {m}"), picked)
                }
                None => ("Agenda".to_string(), notes),
            };
            match output {
                Some(path) => {
                    journal::write_agenda_file(&path, &title, &notes, norm)?;
                    println!("wrote {}", path.display());
                }
                None => journal::write_agenda(&mut std::io::stdout().lock(), &title, &notes, norm)?,
            }
        }

        Commands::Health => {
            if svc.api().health().await {
                println!("ok");
            } else {
                bail!("API unreachable at {}", cfg.api_base_url);
            }
        }
    }

    Ok(())
}

fn print_note(note: &Note) {
    let pin = if note.pinned { "*" } else { " " };
    let bell = if note.reminder { " (reminder)" } else { "" };
    println!(
        "{pin} {:<10} {:<9} {:>6}  {}{bell}",
        note.date, note.priority, note.id, note.title
    );
}
