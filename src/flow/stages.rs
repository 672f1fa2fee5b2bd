//! Stage handlers.
//!
//! Each handler performs the effects of one stage. Handlers never move the
//! stage pointer; the controller advances and persists it once a handler
//! returns `Ok`. A handler may be re-entered after an interruption, so every
//! effect is either idempotent or guarded by an existence check.

use std::sync::Arc;

use crate::account::Provisioner;
use crate::config::{DEFAULT_USERNAME, InitConfig};
use crate::error::{FlowError, Result};
use crate::flow::params::FlowParams;
use crate::flow::prompt::{UsernamePrompt, check_format};
use crate::flow::scope::ScopedDir;
use crate::status::{FlowStatus, Stage, StatusStore};
use crate::system::command::{CommandRunner, CommandSpec};
use crate::system::settings::SystemSettings;
use crate::system::terminal::{Terminal, spaced_letters, to_binary};

/// Word the letters stage asks the operator to decode.
pub const SECRET_WORD: &str = "kano";

/// Directory the operator hunts for in the white rabbit subshell.
pub const RABBIT_HOLE: &str = "rabbithole";

/// Collaborators shared by all stage handlers.
pub struct StageContext {
    pub provisioner: Arc<Provisioner>,
    pub settings: Arc<dyn SystemSettings>,
    pub runner: Arc<dyn CommandRunner>,
    pub terminal: Arc<dyn Terminal>,
    pub config: InitConfig,
}

/// Effect to run only after the stage advance has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterCommit {
    /// Start a system service; failure does not affect the flow.
    StartService(String),
}

/// What a successful handler leaves for the controller.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub after_commit: Vec<AfterCommit>,
}

/// Dispatch to the handler for `stage`.
pub async fn run_stage(
    stage: Stage,
    ctx: &StageContext,
    params: &FlowParams,
    status: &mut FlowStatus,
    store: &StatusStore,
) -> Result<StageOutcome> {
    match stage {
        Stage::Username => username_stage(ctx, params, status, store).await,
        Stage::Lightup => lightup_stage(ctx, params, status).await,
        Stage::Switch => switch_stage(ctx, params, status).await,
        Stage::Letters => letters_stage(ctx, params, status).await,
        Stage::WhiteRabbit => white_rabbit_stage(ctx, params, status).await,
        Stage::Love => love_stage(ctx, params).await,
        Stage::Final => final_stage(ctx, params, status).await,
        Stage::UiInit => Err(FlowError::AlreadyComplete.into()),
    }
}

async fn username_stage(
    ctx: &StageContext,
    params: &FlowParams,
    status: &mut FlowStatus,
    store: &StatusStore,
) -> Result<StageOutcome> {
    let username = match adoptable_account(ctx, status).await? {
        Some(name) => {
            tracing::info!(user = %name, "Completing account from an interrupted run");
            ctx.provisioner.finish_setup(&name).await?;
            name
        }
        None => {
            let name = choose_username(ctx, params).await?;
            // Remember the name before the account exists, so a crash
            // mid-creation resumes with this account instead of a new one.
            status.pending_username = Some(name.clone());
            store.save(status).await?;
            ctx.provisioner.create_user(&name).await?;
            name
        }
    };

    ctx.settings.set_hostname(&username).await?;
    status.record_username(username);
    Ok(StageOutcome::default())
}

/// The pending account of an interrupted username stage, if it was created.
async fn adoptable_account(ctx: &StageContext, status: &FlowStatus) -> Result<Option<String>> {
    let Some(pending) = &status.pending_username else {
        return Ok(None);
    };
    if ctx.provisioner.user_exists(pending).await? {
        Ok(Some(pending.clone()))
    } else {
        Ok(None)
    }
}

async fn choose_username(ctx: &StageContext, params: &FlowParams) -> Result<String> {
    if params.skip {
        let base = params.preset_username.as_deref().unwrap_or(DEFAULT_USERNAME);
        let base = check_format(base).map_err(|reason| FlowError::InvalidPresetUsername {
            name: base.to_string(),
            reason: reason.to_string(),
        })?;
        let name = ctx.provisioner.make_unique(&base).await?;
        // The numeric suffix can push a long base past the length limit.
        check_format(&name).map_err(|reason| FlowError::InvalidPresetUsername {
            name: name.clone(),
            reason: reason.to_string(),
        })?;
        tracing::info!(user = %name, "Provisioning headless account");
        return Ok(name);
    }

    let terminal = ctx.terminal.as_ref();
    terminal.clear_screen().await?;
    terminal.say("Hello!").await?;
    terminal.say("You brought your computer to life.").await?;
    terminal.say("What is your name?").await?;
    UsernamePrompt::new(terminal, &ctx.provisioner).ask().await
}

async fn lightup_stage(
    ctx: &StageContext,
    params: &FlowParams,
    status: &FlowStatus,
) -> Result<StageOutcome> {
    if params.skip {
        return Ok(StageOutcome::default());
    }
    let username = require_username(status, Stage::Lightup)?;
    let terminal = ctx.terminal.as_ref();

    terminal.clear_screen().await?;
    terminal.say(&format!("Nice to meet you {username}!")).await?;
    terminal
        .say("It's very dark here, can you turn the light on?")
        .await?;
    terminal.pause("Press [ENTER] to light up the room.").await?;
    Ok(StageOutcome::default())
}

async fn switch_stage(
    ctx: &StageContext,
    params: &FlowParams,
    status: &FlowStatus,
) -> Result<StageOutcome> {
    if params.skip {
        return Ok(StageOutcome::default());
    }
    let username = require_username(status, Stage::Switch)?;

    // Decorative only: a broken terminal must not hold up onboarding.
    if let Err(e) = show_name_in_binary(ctx.terminal.as_ref(), username).await {
        tracing::warn!(error = %e, "Binary animation failed, continuing");
    }
    Ok(StageOutcome::default())
}

async fn show_name_in_binary(terminal: &dyn Terminal, username: &str) -> Result<()> {
    terminal.clear_screen().await?;
    terminal.say("The light is on! Computers think in ones and zeros.").await?;
    terminal.say("This is what your name looks like to me:").await?;
    terminal
        .say(&format!("{}\n{}", to_binary(username), spaced_letters(username)))
        .await?;
    Ok(())
}

async fn letters_stage(
    ctx: &StageContext,
    params: &FlowParams,
    status: &FlowStatus,
) -> Result<StageOutcome> {
    if params.skip {
        return Ok(StageOutcome::default());
    }
    let username = require_username(status, Stage::Letters)?;
    let terminal = ctx.terminal.as_ref();

    terminal.clear_screen().await?;
    terminal
        .say("Binary code can also represent letters. Here is a secret password:")
        .await?;
    terminal
        .say(&format!(
            "{}\n{}",
            to_binary(SECRET_WORD),
            spaced_letters(SECRET_WORD)
        ))
        .await?;
    terminal
        .say("Can you type the password in human letters?")
        .await?;

    let shell_prompt = format!("{username}@kano ~ $ ");
    loop {
        let answer = terminal.prompt_line(&shell_prompt).await?;
        if answer.trim().to_lowercase() == SECRET_WORD {
            break;
        }
        terminal.say("Not the correct password, keep trying!").await?;
    }
    Ok(StageOutcome::default())
}

async fn white_rabbit_stage(
    ctx: &StageContext,
    params: &FlowParams,
    status: &FlowStatus,
) -> Result<StageOutcome> {
    if params.skip {
        return Ok(StageOutcome::default());
    }
    let username = require_username(status, Stage::WhiteRabbit)?;
    let terminal = ctx.terminal.as_ref();

    let account = ctx
        .provisioner
        .find_user(username)
        .await?
        .ok_or_else(|| FlowError::UnknownAccount {
            name: username.to_string(),
        })?;

    terminal.clear_screen().await?;
    terminal
        .say(&format!("{username}, follow the white rabbit ..."))
        .await?;
    terminal
        .say("It's hiding in the computer world. Can you help to find it?")
        .await?;
    terminal.say(&format!("Type cd {RABBIT_HOLE}")).await?;

    let hole = ScopedDir::create(
        account.home.join(RABBIT_HOLE),
        Some((account.uid, account.gid)),
    )
    .await?;
    let init_file = ctx.config.subshellrc_path.to_string_lossy().into_owned();
    let subshell = CommandSpec::new("sudo").args([
        "-u",
        username,
        "-H",
        "bash",
        "--init-file",
        init_file.as_str(),
    ]);
    let exit_code = ctx.runner.run_interactive(&subshell).await?;
    drop(hole);

    if exit_code != 0 {
        tracing::debug!(exit_code, "Rabbit hole subshell exited with non-zero status");
    }
    terminal.clear_screen().await?;
    Ok(StageOutcome::default())
}

async fn love_stage(ctx: &StageContext, params: &FlowParams) -> Result<StageOutcome> {
    if params.skip {
        return Ok(StageOutcome::default());
    }
    let Some((program, args)) = ctx.config.overworld_command.split_first() else {
        return Ok(StageOutcome::default());
    };

    ctx.terminal.clear_screen().await?;
    let game = CommandSpec::new(program.as_str()).args(args.iter().map(String::as_str));
    match ctx.runner.run_interactive(&game).await {
        Ok(0) => {}
        Ok(code) => tracing::warn!(command = %game, exit_code = code, "Overworld exited abnormally"),
        Err(e) => tracing::warn!(command = %game, error = %e, "Overworld could not start"),
    }
    Ok(StageOutcome::default())
}

async fn final_stage(
    ctx: &StageContext,
    params: &FlowParams,
    status: &FlowStatus,
) -> Result<StageOutcome> {
    let username = require_username(status, Stage::Final)?;
    if !params.skip {
        ctx.terminal.clear_screen().await?;
    }

    ctx.settings.reconfigure_autostart_policy().await?;
    // Autologin stays forced until the graphical first run finishes.
    ctx.settings.set_autologin(username).await?;

    Ok(StageOutcome {
        after_commit: vec![AfterCommit::StartService(
            ctx.config.display_manager.clone(),
        )],
    })
}

fn require_username(status: &FlowStatus, stage: Stage) -> Result<&str> {
    status.username.as_deref().ok_or_else(|| {
        FlowError::MissingUsername {
            stage: stage.to_string(),
        }
        .into()
    })
}
