//! Subcommand implementations.

mod login;
mod logout;
mod refresh;
mod register;
mod request;
mod upload;
mod whoami;

use anyhow::Result;
use clap::Subcommand;

use crate::cli::ConnectionArgs;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new session (login)
    Login(login::LoginArgs),

    /// Register a parent account and sign in
    Register(register::RegisterArgs),

    /// Clear the stored session
    Logout(logout::LogoutArgs),

    /// Display the active session
    Whoami(whoami::WhoamiArgs),

    /// Refresh the session tokens
    Refresh(refresh::RefreshArgs),

    /// Send a GET request
    Get(request::PathArgs),

    /// Send a POST request
    Post(request::BodyArgs),

    /// Send a PUT request
    Put(request::BodyArgs),

    /// Send a PATCH request
    Patch(request::BodyArgs),

    /// Send a DELETE request
    Delete(request::PathArgs),

    /// Upload files as a multipart form
    Upload(upload::UploadArgs),
}

pub async fn handle(command: Command, connection: &ConnectionArgs) -> Result<()> {
    match command {
        Command::Login(args) => login::run(args, connection).await,
        Command::Register(args) => register::run(args, connection).await,
        Command::Logout(args) => logout::run(args, connection).await,
        Command::Whoami(args) => whoami::run(args, connection).await,
        Command::Refresh(args) => refresh::run(args, connection).await,
        Command::Get(args) => request::get(args, connection).await,
        Command::Post(args) => request::send(request::Verb::Post, args, connection).await,
        Command::Put(args) => request::send(request::Verb::Put, args, connection).await,
        Command::Patch(args) => request::send(request::Verb::Patch, args, connection).await,
        Command::Delete(args) => request::delete(args, connection).await,
        Command::Upload(args) => upload::run(args, connection).await,
    }
}
