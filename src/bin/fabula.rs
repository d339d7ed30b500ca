//! Fabula CLI: interactive fiction over a remote storyteller.
//!
//! Usage:
//!   fabula play [--api-key KEY] [--model NAME] [--story PATH] [--images free|premium|off]
//!   fabula decode <FILE>
//!   fabula story <init|check> [--story PATH]

use clap::{Parser, Subcommand, ValueEnum};
use fabula::{
    Credential, FreeImageProvider, GeminiClient, Illustration, ImageProvider, ImageSidecar,
    Outcome, Phase, PremiumImageProvider, Recovery, Scene, SessionController, StoryProfile,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "fabula",
    version,
    about = "Interactive fiction driven by a remote storyteller"
)]
struct Cli {
    /// Show library log output (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a story at the terminal
    Play {
        /// Credential for the story service; falls back to FABULA_API_KEY
        #[arg(long)]
        api_key: Option<String>,
        /// Text model to converse with
        #[arg(long)]
        model: Option<String>,
        /// Path to a story profile file
        #[arg(long)]
        story: Option<PathBuf>,
        /// Scene illustration mode
        #[arg(long, value_enum, default_value = "free")]
        images: ImageMode,
    },
    /// Run a saved reply through scene reconciliation and print the result
    Decode {
        /// File holding raw reply text
        file: PathBuf,
    },
    /// Manage the story profile
    Story {
        #[command(subcommand)]
        action: StoryAction,
        /// Path to a story profile file
        #[arg(long, global = true)]
        story: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ImageMode {
    /// Keyless on-demand renders
    Free,
    /// Keyed renders with free fallback; reads FABULA_IMAGE_KEY
    Premium,
    /// No illustrations
    Off,
}

#[derive(Subcommand)]
enum StoryAction {
    /// Write a starter profile to edit
    Init,
    /// Parse the profile and show what a session would use
    Check,
}

/// Get the default story profile path (~/.config/fabula/story.yaml)
fn default_story_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
    let fabula_dir = config_dir.join("fabula");
    std::fs::create_dir_all(&fabula_dir).ok();
    fabula_dir.join("story.yaml")
}

fn load_profile(story: Option<PathBuf>) -> Result<StoryProfile, String> {
    let path = story.unwrap_or_else(default_story_path);
    if !path.exists() {
        return Ok(StoryProfile::default());
    }
    StoryProfile::load(&path)
        .map_err(|e| format!("failed to read story profile {}: {}", path.display(), e))
}

/// Read one trimmed line from stdin; None when stdin is closed
fn prompt_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) => None,
        Ok(_) => Some(input.trim().to_string()),
        Err(_) => None,
    }
}

fn build_sidecar(mode: ImageMode, profile: &StoryProfile) -> Option<Arc<ImageSidecar>> {
    let provider: Arc<dyn ImageProvider> = match mode {
        ImageMode::Off => return None,
        ImageMode::Free => Arc::new(FreeImageProvider::new()),
        ImageMode::Premium => match std::env::var("FABULA_IMAGE_KEY") {
            Ok(key) if !key.is_empty() => Arc::new(PremiumImageProvider::new(Credential::new(key))),
            _ => {
                eprintln!("warning: FABULA_IMAGE_KEY is not set; using free images");
                Arc::new(FreeImageProvider::new())
            }
        },
    };
    Some(Arc::new(ImageSidecar::new(
        provider,
        profile.image_style.clone(),
    )))
}

fn print_scene(scene: &Scene, micro_arc: u32, sidecar: Option<&ImageSidecar>) {
    println!();
    println!(
        "=== {} / {} (micro-arc {}) ===",
        scene.act_title, scene.scene_title, micro_arc
    );
    println!();
    println!("{}", scene.description);
    if let Some(sidecar) = sidecar {
        if let Illustration::Ready { scene: owner, url } = sidecar.current() {
            if owner == scene.id {
                println!();
                println!("[illustration] {}", url);
            }
        }
    }
    if !scene.suggested_focus.is_empty() {
        println!();
        println!("(focus: {})", scene.suggested_focus);
    }
    if !scene.choices.is_empty() {
        println!();
        for (index, choice) in scene.choices.iter().enumerate() {
            println!("  {}. {}", index + 1, choice.text);
        }
    }
}

fn cmd_play(
    api_key: Option<String>,
    model: Option<String>,
    story: Option<PathBuf>,
    images: ImageMode,
) -> i32 {
    let profile = match load_profile(story) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        let mut client = GeminiClient::new(profile.clone());
        if let Some(model) = model {
            client = client.with_model(model);
        }
        let sidecar = build_sidecar(images, &profile);
        let mut controller = SessionController::new(Arc::new(client));
        if let Some(sidecar) = sidecar.clone() {
            controller = controller.with_sidecar(sidecar);
        }

        let credential = api_key
            .or_else(|| std::env::var("FABULA_API_KEY").ok())
            .filter(|key| !key.is_empty())
            .map(Credential::new);
        controller.resolve_credential(credential);

        if controller.phase() == Phase::AwaitingCredential {
            println!("No credential found in --api-key or FABULA_API_KEY.");
            let typed = match prompt_line("api key> ") {
                Some(line) if !line.is_empty() => line,
                _ => {
                    eprintln!("Error: a credential is required to play");
                    return 1;
                }
            };
            controller.submit_credential(Credential::new(typed));
        }

        println!();
        println!("{}", profile.title);
        println!("Starting a new story...");
        controller.begin_session().await;

        loop {
            match controller.phase() {
                Phase::Active => {
                    let Some(scene) = controller.scene() else {
                        controller.begin_session().await;
                        continue;
                    };
                    print_scene(scene, controller.micro_arc(), sidecar.as_deref());
                    let choices: Vec<String> =
                        scene.choices.iter().map(|c| c.text.clone()).collect();

                    let Some(line) = prompt_line("> ") else { return 0 };
                    match line.as_str() {
                        "quit" | "exit" => return 0,
                        "restart" => controller.begin_session().await,
                        _ => match line.parse::<usize>() {
                            Ok(n) if n >= 1 && n <= choices.len() => {
                                controller.submit_choice(choices[n - 1].clone()).await;
                            }
                            _ => println!(
                                "Enter a choice number 1-{}, or quit / restart.",
                                choices.len()
                            ),
                        },
                    }
                }
                Phase::Failed => {
                    let hint = match controller.failure() {
                        Some(failure) => {
                            println!();
                            println!("The story hit a snag: {}", failure.message());
                            match failure.recovery() {
                                Recovery::Redecode { .. } => "retry re-reads the last reply",
                                Recovery::Reissue => "retry resends the request",
                            }
                        }
                        None => "retry",
                    };
                    println!("Commands: retry | restart | quit ({})", hint);

                    let Some(line) = prompt_line("> ") else { return 1 };
                    match line.as_str() {
                        "retry" | "" => controller.invoke_recovery().await,
                        "restart" => controller.begin_session().await,
                        "quit" | "exit" => return 1,
                        _ => println!("Enter retry, restart, or quit."),
                    }
                }
                Phase::Ended => {
                    if let Some(scene) = controller.scene() {
                        print_scene(scene, controller.micro_arc(), sidecar.as_deref());
                        println!();
                        match scene.outcome {
                            Outcome::Victory => println!("THE END. You made it out."),
                            Outcome::Defeat => println!("THE END. The port keeps what it takes."),
                            Outcome::Ongoing => {}
                        }
                    }
                    let Some(line) = prompt_line("play again? (y/n) > ") else {
                        return 0;
                    };
                    if matches!(line.as_str(), "y" | "yes") {
                        controller.begin_session().await;
                    } else {
                        return 0;
                    }
                }
                phase => {
                    eprintln!("unexpected session phase: {:?}", phase);
                    return 1;
                }
            }
        }
    })
}

fn cmd_decode(file: &Path) -> i32 {
    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", file.display(), e);
            return 1;
        }
    };
    match fabula::scene::parse(&raw) {
        Ok(scene) => {
            println!("{} / {}", scene.act_title, scene.scene_title);
            println!();
            println!("{}", scene.description);
            for (index, choice) in scene.choices.iter().enumerate() {
                println!("  {}. {}", index + 1, choice.text);
            }
            println!(
                "flags: scene_end={} micro_arc_end={} act_end={} outcome={:?}",
                scene.flags.scene_end, scene.flags.micro_arc_end, scene.flags.act_end, scene.outcome
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_story_init(path: &Path) -> i32 {
    if path.exists() {
        eprintln!("Error: {} already exists", path.display());
        return 1;
    }
    let yaml = match StoryProfile::default().to_yaml() {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match std::fs::write(path, yaml) {
        Ok(()) => {
            println!("Wrote starter profile to {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: cannot write {}: {}", path.display(), e);
            1
        }
    }
}

fn cmd_story_check(path: &Path) -> i32 {
    let profile = if path.exists() {
        match StoryProfile::load(path) {
            Ok(profile) => profile,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        println!("No profile at {}; the built-in story applies.", path.display());
        StoryProfile::default()
    };
    println!("Title: {}", profile.title);
    println!("Premise: {}", profile.premise);
    println!("Image style: {}", profile.image_style);
    0
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "fabula=debug" } else { "fabula=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let code = match cli.command {
        Commands::Play {
            api_key,
            model,
            story,
            images,
        } => cmd_play(api_key, model, story, images),
        Commands::Decode { file } => cmd_decode(&file),
        Commands::Story { action, story } => {
            let path = story.unwrap_or_else(default_story_path);
            match action {
                StoryAction::Init => cmd_story_init(&path),
                StoryAction::Check => cmd_story_check(&path),
            }
        }
    };
    std::process::exit(code);
}
