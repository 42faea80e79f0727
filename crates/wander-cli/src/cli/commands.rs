//! Command handlers.

use anyhow::{Context, Result};
use wander_core::credentials::{TripTab, mask_token};

use super::App;

pub async fn login(app: &App, username: &str, password: &str) -> Result<()> {
    app.client
        .login(username, password)
        .await
        .context("log in")?;
    println!("Logged in as {username}.");
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    app.client.logout().await;
    if let Some(message) = app.session.message() {
        println!("{}", message.text);
    }
    Ok(())
}

pub async fn whoami(app: &App) -> Result<()> {
    if app.store.access_token().is_none() {
        println!("Not logged in.");
        return Ok(());
    }

    app.session
        .fetch_current_user(&app.client)
        .await
        .context("fetch current user")?;

    match app.session.current_user() {
        Some(user) => {
            let name = match (&user.first_name, &user.last_name) {
                (Some(first), Some(last)) => format!("{first} {last}"),
                _ => user.username.clone(),
            };
            println!("{} (id {})", name, user.id);
            if let Some(token) = app.store.access_token() {
                println!("access token: {}", mask_token(&token));
            }
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

pub async fn dashboard(app: &App, user: Option<u64>, year: Option<i32>) -> Result<()> {
    let body = app
        .dashboard
        .overview(&app.client, user, year)
        .await
        .context("fetch dashboard overview")?;

    // Remember the year filter the same way the web client did.
    app.store
        .set_selected_year(year.map(|y| y.to_string()).as_deref());

    println!("{}", serde_json::to_string_pretty(&body)?);

    let years = app.dashboard.available_years();
    if !years.is_empty() {
        let list: Vec<String> = years.iter().map(ToString::to_string).collect();
        println!("Years with data: {}", list.join(", "));
    }
    Ok(())
}

pub fn tab(app: &App, tab: Option<&str>) -> Result<()> {
    if let Some(raw) = tab {
        let parsed: TripTab = raw.parse()?;
        app.store.set_selected_tab(parsed);
        println!("Selected tab: {}", parsed.as_str());
    } else {
        println!("Selected tab: {}", app.store.selected_tab().as_str());
    }
    Ok(())
}
