//! Plan and task catalogs.
//!
//! Both catalogs are fixed at configuration time. Plans describe what the
//! store sells; tasks describe the external links that unlock the daily
//! special offer.

use serde::{Deserialize, Serialize};

use crate::constants::KOBO_PER_NAIRA;
use crate::types::{Amount, TaskId, Taps};

// ── Plans ────────────────────────────────────────────────────────────────────

/// How a plan is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlanKind {
    /// Bought through the payment collaborator, any number of times.
    #[default]
    Standard,
    /// Daily special offer: paid, unlocked by completing every task, once
    /// per day.
    Special,
    /// One-time free grant per identity. Never touches the payment
    /// collaborator.
    Free,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerPlan {
    pub name: String,
    /// Price in whole Naira.
    pub price: Amount,
    /// Advertised daily yield. Display only.
    #[serde(default)]
    pub daily: Amount,
    /// Capacity added on purchase. Permanent and cumulative.
    pub taps: Taps,
    #[serde(default)]
    pub kind: PlanKind,
}

impl MinerPlan {
    fn new(name: &str, price: Amount, daily: Amount, taps: Taps, kind: PlanKind) -> Self {
        Self { name: name.to_string(), price, daily, taps, kind }
    }

    /// Amount to hand the payment collaborator, in kobo.
    pub fn amount_minor(&self) -> i64 {
        self.price * KOBO_PER_NAIRA
    }

    pub fn requires_payment(&self) -> bool {
        self.kind != PlanKind::Free && self.price > 0
    }
}

/// The store as it shipped.
pub fn default_plans() -> Vec<MinerPlan> {
    use PlanKind::*;
    vec![
        MinerPlan::new("Super Taps", 100, 0, 10, Special),
        MinerPlan::new("Free Taps", 0, 0, 10, Free),
        MinerPlan::new("Newbie Taps", 100, 0, 5, Standard),
        MinerPlan::new("Mini Taps", 500, 500, 5, Standard),
        MinerPlan::new("Starter Taps", 1_000, 1_000, 10, Standard),
        MinerPlan::new("Bronze Miner", 5_000, 25_000, 100, Standard),
        MinerPlan::new("Silver Miner", 10_000, 50_000, 200, Standard),
        MinerPlan::new("Gold Miner", 15_000, 75_000, 300, Standard),
        MinerPlan::new("Platinum Miner", 20_000, 100_000, 400, Standard),
    ]
}

// ── Tasks ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// Minimum seconds the user must stay away from the page. `None` means
    /// the task completes as soon as it is triggered.
    #[serde(default)]
    pub dwell_secs: Option<u32>,
}

impl TaskSpec {
    fn new(id: &str, name: &str, url: &str, description: &str, dwell_secs: Option<u32>) -> Self {
        Self {
            id: TaskId::new(id),
            name: name.to_string(),
            url: url.to_string(),
            description: description.to_string(),
            dwell_secs,
        }
    }

    /// Dwell time in milliseconds, if the task is timed.
    pub fn dwell_ms(&self) -> Option<i64> {
        self.dwell_secs.map(|s| s as i64 * 1_000)
    }
}

pub fn default_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("video", "Watch Video Ad", "https://myfin.ng/ads/video", "Watch a short video.", Some(10)),
        TaskSpec::new("facebookLike", "Like Facebook Post", "https://facebook.com/myfinng", "Like our latest post.", Some(10)),
        TaskSpec::new("facebookFollow", "Follow Facebook Page", "https://facebook.com/myfinng", "Follow our page.", Some(5)),
        TaskSpec::new("instagram", "Follow on Instagram", "https://www.instagram.com/myfinng", "Follow our Instagram page.", Some(5)),
        TaskSpec::new("xFollow", "Follow page on X", "https://x.com/myfinng", "Follow our page on X.", Some(5)),
        TaskSpec::new("telegram", "Join Telegram Channel", "https://t.me/myfinng", "Join our community channel.", Some(5)),
        TaskSpec::new("youtube", "Watch YouTube Video", "https://youtube.com/@myfinng", "Watch one of our videos.", Some(10)),
        TaskSpec::new("tiktok", "Watch TikTok Video", "https://www.tiktok.com/@myfinng", "Watch one of our videos.", Some(10)),
    ]
}
