//! Text and JSON rendering of command results.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use dinecache_core::cache::CacheStatus;
use dinecache_core::helper::{image_url_for_restaurant, url_for_restaurant};
use dinecache_core::models::{FavoriteUpdate, Restaurant, Review};
use dinecache_core::router::Response;
use dinecache_core::sync::SyncReport;
use dinecache_core::utils::{format_count, format_hours, truncate_string};
use dinecache_core::{Config, WarmReport};

const NAME_WIDTH: usize = 32;
const COLUMN_WIDTH: usize = 16;

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn message(&self, text: &str) -> Result<()> {
        if self.json {
            return self.print_json(&json!({ "message": text }));
        }
        println!("{}", text);
        Ok(())
    }

    pub fn names(&self, names: &[String]) -> Result<()> {
        if self.json {
            return self.print_json(names);
        }
        for name in names {
            println!("{}", name);
        }
        Ok(())
    }

    pub fn restaurants(&self, restaurants: &[Restaurant]) -> Result<()> {
        if self.json {
            return self.print_json(restaurants);
        }
        for r in restaurants {
            println!(
                "{:>4} {} {:<name_w$} {:<col_w$} {}",
                r.id,
                r.favorite_display(),
                truncate_string(&r.name, NAME_WIDTH),
                truncate_string(&r.neighborhood, COLUMN_WIDTH),
                r.cuisine_type,
                name_w = NAME_WIDTH,
                col_w = COLUMN_WIDTH,
            );
        }
        println!("{}", format_count(restaurants.len(), "restaurant", "restaurants"));
        Ok(())
    }

    pub fn restaurant(&self, restaurant: &Restaurant, reviews: &[Review]) -> Result<()> {
        if self.json {
            return self.print_json(&json!({
                "restaurant": restaurant,
                "url": url_for_restaurant(restaurant),
                "image": image_url_for_restaurant(restaurant),
                "reviews": reviews,
            }));
        }
        println!("{} {}", restaurant.favorite_display(), restaurant.name);
        println!("  {} - {}", restaurant.cuisine_type, restaurant.neighborhood);
        println!("  {}", restaurant.address);
        println!("  {}", image_url_for_restaurant(restaurant));
        for (day, hours) in format_hours(&restaurant.operating_hours) {
            println!("  {:<10} {}", day, hours);
        }
        println!();
        self.reviews(reviews)
    }

    pub fn reviews(&self, reviews: &[Review]) -> Result<()> {
        if self.json {
            return self.print_json(reviews);
        }
        if reviews.is_empty() {
            println!("No reviews yet!");
            return Ok(());
        }
        for review in reviews {
            let pending = if review.is_pending() { " (pending)" } else { "" };
            println!("{}  {}{}", review.stars_display(), review.name, pending);
            println!("  {}", review.date_display());
            println!("  {}", review.comments);
        }
        Ok(())
    }

    pub fn favorite(&self, update: &FavoriteUpdate, queued: usize) -> Result<()> {
        if self.json {
            return self.print_json(&json!({ "update": update, "queued": queued }));
        }
        let state = if update.value { "marked as favorite" } else { "no longer a favorite" };
        println!("Restaurant {} {}", update.id, state);
        self.queue_note(queued);
        Ok(())
    }

    pub fn saved_review(&self, review: &Review, queued: usize) -> Result<()> {
        if self.json {
            return self.print_json(&json!({ "review": review, "queued": queued }));
        }
        println!("Review saved for restaurant {}", review.restaurant_id);
        self.queue_note(queued);
        Ok(())
    }

    fn queue_note(&self, queued: usize) {
        if queued > 0 {
            println!(
                "{} waiting for the server",
                format_count(queued, "write", "writes")
            );
        }
    }

    pub fn response(&self, response: &Response) -> Result<()> {
        if self.json {
            let body = response
                .json::<serde_json::Value>()
                .unwrap_or_else(|_| serde_json::Value::String(response.text()));
            return self.print_json(&json!({
                "status": response.status,
                "source": response.source,
                "body": body,
            }));
        }
        println!("{} ({:?})", response.status, response.source);
        println!("{}", response.text());
        Ok(())
    }

    pub fn sync_report(&self, report: &SyncReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        println!(
            "Sent {}, dropped {}, {} still queued",
            report.replayed, report.dropped, report.remaining
        );
        if let Some(ref reason) = report.interrupted {
            println!("Stopped early: {}", reason);
        }
        Ok(())
    }

    pub fn warm_report(&self, report: &WarmReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        println!(
            "Cached {} and {}",
            format_count(report.restaurants, "restaurant", "restaurants"),
            format_count(report.reviews, "review", "reviews")
        );
        if report.failed > 0 {
            println!("{} failed, run again when online", format_count(report.failed, "request", "requests"));
        }
        Ok(())
    }

    pub fn status(&self, status: &CacheStatus, config: &Config) -> Result<()> {
        if self.json {
            return self.print_json(&json!({
                "status": status,
                "api_base_url": config.api_base_url,
                "offline_mode": config.offline_mode,
            }));
        }
        println!("Server:         {}", config.api_base_url);
        println!("Offline mode:   {}", if config.offline_mode { "on" } else { "off" });
        println!("Restaurants:    {} (list cached {})", status.restaurants, status.restaurants_age());
        println!("Reviews:        {} ({} pending)", status.reviews, status.pending_reviews);
        println!("Queued writes:  {}", status.queued);
        Ok(())
    }

    pub fn config(&self, config: &Config, path: &Path) -> Result<()> {
        if self.json {
            return self.print_json(&json!({ "path": path, "config": config }));
        }
        println!("Config file: {}", path.display());
        println!("{}", serde_json::to_string_pretty(config)?);
        Ok(())
    }
}
