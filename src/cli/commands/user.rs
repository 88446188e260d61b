//! `storyline user` command - accounts and roles

use clap::Subcommand;
use miette::Result;

use crate::cli::commands::Session;
use crate::cli::GlobalOpts;
use crate::core::principal::Role;
use crate::entities::user::NewUser;

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create a user (administrators)
    Add {
        username: String,
        #[arg(long, value_enum, default_value_t = Role::User)]
        role: Role,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// List users
    List,
    /// Show a user
    Show { user: String },
    /// Change a user's role (administrators)
    Role {
        user: String,
        #[arg(value_enum)]
        role: Role,
    },
    /// Delete a user nothing references (administrators)
    Rm { user: String },
    /// Show the acting user
    Whoami,
}

pub fn run(cmd: UserCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        UserCommands::Add {
            username,
            role,
            name,
            email,
        } => {
            let user = service.create_user(
                ctx,
                NewUser {
                    username,
                    display_name: name,
                    email,
                    role,
                },
            )?;
            if !out.structured(&user)? {
                out.success(format!("Created {} ({})", user.username, user.role));
            }
        }
        UserCommands::List => out.list(&service.list_users(ctx)?)?,
        UserCommands::Show { user } => {
            let user = service.get_user(ctx, &user)?;
            out.record(&user, None)?;
        }
        UserCommands::Role { user, role } => {
            let user = service.update_user_role(ctx, &user, role)?;
            if !out.structured(&user)? {
                out.success(format!("{} is now {}", user.username, user.role));
            }
        }
        UserCommands::Rm { user } => {
            let user = service.delete_user(ctx, &user)?;
            out.success(format!("Deleted {}", user.username));
        }
        UserCommands::Whoami => {
            let principal = ctx.principal()?;
            let user = service.get_user(ctx, &principal.username)?;
            out.record(&user, None)?;
        }
    }
    Ok(())
}
