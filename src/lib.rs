//! yt-likesbot: detects newly liked YouTube videos for registered users
//! and fans out FCM push notifications, keeping an idempotent download
//! ledger of everything already surfaced.

pub mod config;
pub mod db;
pub mod detector;
pub mod dispatch;
pub mod duration;
pub mod fcm;
pub mod ledger;
pub mod model;
pub mod poller;
pub mod youtube;
