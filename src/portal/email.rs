//! Email composition for status-change notifications.
//!
//! `compose_*` builds the send payload from a stored record; `render` turns the
//! payload into the subject, HTML body and plain-text body handed to the
//! mailer.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::models::{Grievance, MeetingRequest, RecordKind};

/// Sender identity and default reply-to address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub from_name: String,
    pub from_email: String,
    pub reply_to: String,
}

/// Payload describing one status-change email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailEnvelope {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub recipient_email: String,
    pub recipient_name: String,
    pub subject: String,
    /// Human-readable status label, not the wire status.
    pub status: String,
    pub response: String,
    pub meeting_date: Option<String>,
    pub reply_to: String,
    pub from_name: String,
}

/// A fully rendered email, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn compose_grievance_email(grievance: &Grievance, settings: &EmailSettings) -> EmailEnvelope {
    EmailEnvelope {
        kind: RecordKind::Doleance,
        recipient_email: grievance.email.clone(),
        recipient_name: grievance.full_name(),
        subject: format!("Votre doléance : {}", grievance.subject),
        status: grievance.status.label().to_string(),
        response: grievance.response.clone().unwrap_or_default(),
        meeting_date: None,
        reply_to: settings.reply_to.clone(),
        from_name: settings.from_name.clone(),
    }
}

pub fn compose_meeting_email(meeting: &MeetingRequest, settings: &EmailSettings) -> EmailEnvelope {
    EmailEnvelope {
        kind: RecordKind::Audience,
        recipient_email: meeting.email.clone(),
        recipient_name: meeting.full_name(),
        subject: format!("Votre demande d'audience : {}", meeting.subject),
        status: meeting.status.label().to_string(),
        response: meeting.response.clone().unwrap_or_default(),
        meeting_date: meeting.meeting_date.map(format_french_datetime),
        reply_to: settings.reply_to.clone(),
        from_name: settings.from_name.clone(),
    }
}

const WEEKDAYS: [&str; 7] = [
    "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche",
];

const MONTHS: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// `2025-10-14T14:30` → `mardi 14 octobre 2025 à 14h30`.
pub fn format_french_datetime(dt: NaiveDateTime) -> String {
    let weekday = WEEKDAYS[dt.weekday().num_days_from_monday() as usize];
    let month = MONTHS[dt.month0() as usize];
    format!(
        "{} {} {} {} à {}h{:02}",
        weekday,
        dt.day(),
        month,
        dt.year(),
        dt.hour(),
        dt.minute()
    )
}

/// Minimal escaping for text interpolated into HTML. Quotes are left alone so
/// French apostrophes survive untouched.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn intro(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Doleance => "Le statut de votre doléance a été mis à jour.",
        RecordKind::Audience => "Le statut de votre demande d'audience a été mis à jour.",
    }
}

pub fn render(envelope: &EmailEnvelope, from_email: &str) -> OutgoingEmail {
    let mut text = format!(
        "Bonjour {},\n\n{}\n\nNouveau statut : {}\n",
        envelope.recipient_name,
        intro(envelope.kind),
        envelope.status
    );
    let mut html = format!(
        "<p>Bonjour {},</p>\n<p>{}</p>\n<p><strong>Nouveau statut :</strong> {}</p>\n",
        escape_html(&envelope.recipient_name),
        intro(envelope.kind),
        escape_html(&envelope.status)
    );

    if envelope.kind == RecordKind::Audience
        && let Some(date) = envelope.meeting_date.as_deref()
    {
        text.push_str(&format!("\nDétails du rendez-vous :\nDate : {}\n", date));
        html.push_str(&format!(
            "<h3>Détails du rendez-vous</h3>\n<p>Date : {}</p>\n",
            escape_html(date)
        ));
    }

    if !envelope.response.trim().is_empty() {
        text.push_str(&format!("\nRéponse :\n{}\n", envelope.response));
        html.push_str(&format!(
            "<h3>Réponse</h3>\n<p>{}</p>\n",
            escape_html(&envelope.response).replace('\n', "<br>")
        ));
    }

    text.push_str(&format!(
        "\nPour toute question, répondez simplement à cet email.\n\n{}\n",
        envelope.from_name
    ));
    html.push_str(&format!(
        "<p>Pour toute question, répondez simplement à cet email.</p>\n<p>{}</p>\n",
        escape_html(&envelope.from_name)
    ));

    OutgoingEmail {
        from: format!("{} <{}>", envelope.from_name, from_email),
        to: envelope.recipient_email.clone(),
        reply_to: envelope.reply_to.clone(),
        subject: envelope.subject.clone(),
        html,
        text,
    }
}

/// Short heads-up sent to the office when a citizen submits something new.
pub fn render_admin_alert(
    kind: RecordKind,
    id: i64,
    submitter: &str,
    subject: &str,
    settings: &EmailSettings,
    admin_email: &str,
) -> OutgoingEmail {
    let what = match kind {
        RecordKind::Doleance => "Nouvelle doléance",
        RecordKind::Audience => "Nouvelle demande d'audience",
    };
    let text = format!(
        "{} n°{} de {}.\n\nObjet : {}\n",
        what, id, submitter, subject
    );
    let html = format!(
        "<p>{} n°{} de {}.</p>\n<p><strong>Objet :</strong> {}</p>\n",
        what,
        id,
        escape_html(submitter),
        escape_html(subject)
    );
    OutgoingEmail {
        from: format!("{} <{}>", settings.from_name, settings.from_email),
        to: admin_email.to_string(),
        reply_to: settings.reply_to.clone(),
        subject: format!("{} : {}", what, subject),
        html,
        text,
    }
}
