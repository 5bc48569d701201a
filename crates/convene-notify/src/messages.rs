//! Email texts.

use convene_db::models::{ReminderRow, ReviewNoticeRow, RsvpNoticeRow};

use crate::mailer::OutgoingEmail;

const SIGNATURE: &str = "Best regards,\nEvent Management Team";

/// Renders a stored timestamp as e.g. "March 05, 2030 at 06:30 PM" (UTC).
/// Unparseable values are shown as stored.
fn human_time(stored: &str) -> String {
    match convene_db::parse_timestamp(stored) {
        Ok(at) => at.format("%B %d, %Y at %I:%M %p").to_string(),
        Err(_) => stored.to_string(),
    }
}

pub fn rsvp_confirmation(notice: &RsvpNoticeRow) -> OutgoingEmail {
    OutgoingEmail {
        to: notice.email.clone(),
        subject: format!("RSVP Confirmation: {}", notice.event_title),
        body: format!(
            "Hi {},\n\n\
             Thank you for RSVPing to \"{}\"!\n\n\
             Status: {}\n\
             Event Details:\n\
             - Location: {}\n\
             - Start: {}\n\
             - End: {}\n\n\
             We look forward to seeing you there!\n\n{SIGNATURE}\n",
            notice.username,
            notice.event_title,
            notice.status,
            notice.location,
            human_time(&notice.start_time),
            human_time(&notice.end_time),
        ),
    }
}

pub fn review_notification(notice: &ReviewNoticeRow) -> OutgoingEmail {
    let stars = "⭐".repeat(notice.rating.clamp(0, 5) as usize);
    OutgoingEmail {
        to: notice.organizer_email.clone(),
        subject: format!("New Review for Your Event: {}", notice.event_title),
        body: format!(
            "Hi {},\n\n\
             {} has left a review for your event \"{}\".\n\n\
             Rating: {stars} ({}/5)\n\
             Comment: {}\n\n\
             Keep up the great work!\n\n{SIGNATURE}\n",
            notice.organizer_username,
            notice.reviewer_username,
            notice.event_title,
            notice.rating,
            notice.comment,
        ),
    }
}

pub fn event_reminder(row: &ReminderRow) -> OutgoingEmail {
    OutgoingEmail {
        to: row.email.clone(),
        subject: format!("Reminder: {} starts tomorrow!", row.event_title),
        body: format!(
            "Hi {},\n\n\
             This is a friendly reminder that the event \"{}\" is starting soon!\n\n\
             Event Details:\n\
             - Location: {}\n\
             - Start: {}\n\
             - End: {}\n\n\
             See you there!\n\n{SIGNATURE}\n",
            row.username,
            row.event_title,
            row.location,
            human_time(&row.start_time),
            human_time(&row.end_time),
        ),
    }
}
