//! Invoices, contracts and delivery receipts rendered as standalone HTML.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::document::{DocumentKind, GeneratedDocument};
use crate::models::matching::{Match, MatchStatus};
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::models::trip::Trip;
use crate::models::user::User;
use crate::state::AppState;

struct Context {
    shipment: Shipment,
    matched: Match,
    trip: Option<Trip>,
    sender: Option<User>,
    traveler: Option<User>,
}

fn load_context(state: &AppState, shipment_id: Uuid) -> Result<Context, AppError> {
    let shipment = state
        .shipments
        .get(&shipment_id)
        .map(|s| s.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))?;
    let matched = state
        .matches
        .iter()
        .find(|m| m.shipment_id == shipment_id && m.status == MatchStatus::Accepted)
        .map(|m| m.value().clone())
        .ok_or_else(|| AppError::Conflict("shipment has no accepted match".to_string()))?;

    Ok(Context {
        trip: state.trips.get(&matched.trip_id).map(|t| t.value().clone()),
        sender: state.users.get(&matched.sender_id).map(|u| u.value().clone()),
        traveler: state.users.get(&matched.traveler_id).map(|u| u.value().clone()),
        shipment,
        matched,
    })
}

fn document_number(kind: DocumentKind, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        kind.prefix(),
        now.format("%Y%m%d"),
        suffix[..6].to_uppercase()
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn name_of(user: Option<&User>) -> String {
    user.map(|u| escape(&u.full_name()))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(html, "<tr><th>{label}</th><td>{value}</td></tr>");
}

fn render(kind: DocumentKind, number: &str, ctx: &Context, now: DateTime<Utc>) -> String {
    let shipment = &ctx.shipment;
    let economics = ctx.matched.economics.clone().unwrap_or_default();
    let mut html = String::new();

    let _ = writeln!(
        html,
        "<!DOCTYPE html>\n<html lang=\"fr\">\n<head><meta charset=\"utf-8\"><title>{title} {number}</title></head>\n<body>",
        title = kind.title()
    );
    let _ = writeln!(html, "<h1>Kleer Logistics - {}</h1>", kind.title());
    let _ = writeln!(
        html,
        "<p>No. {number} &middot; issued {}</p>",
        now.format("%Y-%m-%d %H:%M UTC")
    );
    html.push_str("<table>\n");
    row(&mut html, "Tracking number", &escape(&shipment.tracking_number));
    row(&mut html, "Sender", &name_of(ctx.sender.as_ref()));
    row(&mut html, "Traveler", &name_of(ctx.traveler.as_ref()));
    row(
        &mut html,
        "Route",
        &format!(
            "{} &rarr; {}, {}",
            escape(&shipment.origin_city),
            escape(&shipment.destination_city),
            escape(&shipment.destination_country)
        ),
    );
    if let Some(trip) = &ctx.trip {
        row(
            &mut html,
            "Departure",
            &trip.departure_date.format("%Y-%m-%d").to_string(),
        );
    }
    row(&mut html, "Weight", &format!("{} kg", shipment.weight));
    row(&mut html, "Recipient", &escape(&shipment.recipient_name));

    match kind {
        DocumentKind::Invoice => {
            row(&mut html, "Transport price", &format!("{} DZD", economics.price));
            row(
                &mut html,
                "Packaging fee",
                &format!("{} DZD", economics.packaging_fee),
            );
            row(&mut html, "Service fee", &format!("{} DZD", economics.service_fee));
            row(
                &mut html,
                "Platform commission",
                &format!("{} DZD ({}%)", economics.platform_commission, economics.commission_rate),
            );
            row(
                &mut html,
                "Paid",
                if shipment.is_paid { "yes" } else { "no" },
            );
        }
        DocumentKind::Contract => {
            row(&mut html, "Agreed price", &format!("{} DZD", economics.price));
            row(
                &mut html,
                "Traveler earnings",
                &format!("{} DZD", economics.traveler_earnings),
            );
            html.push_str("</table>\n<p>The traveler agrees to carry the package described above and to hand it to the recipient against the delivery code. The sender confirms the package contains no prohibited goods.</p>\n<table>\n");
        }
        DocumentKind::Receipt => {
            let delivered = ctx
                .matched
                .delivery_confirmed_at
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default();
            row(&mut html, "Delivered at", &delivered);
            row(&mut html, "Amount", &format!("{} DZD", economics.price));
        }
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

pub fn generate(
    state: &AppState,
    owner_id: Uuid,
    shipment_id: Uuid,
    kind: DocumentKind,
    now: DateTime<Utc>,
) -> Result<GeneratedDocument, AppError> {
    let ctx = load_context(state, shipment_id)?;
    if !ctx.matched.is_party(owner_id) {
        return Err(AppError::Forbidden(
            "only the sender and the traveler can request documents".to_string(),
        ));
    }
    if kind == DocumentKind::Receipt && ctx.shipment.status != ShipmentStatus::Delivered {
        return Err(AppError::Conflict(
            "a receipt is available once the shipment is delivered".to_string(),
        ));
    }

    if let Some(existing) = state
        .documents
        .iter()
        .find(|d| d.owner_id == owner_id && d.shipment_id == shipment_id && d.kind == kind)
        .map(|d| d.value().clone())
    {
        return Ok(existing);
    }

    let number = document_number(kind, now);
    let document = GeneratedDocument {
        id: Uuid::new_v4(),
        kind,
        html: render(kind, &number, &ctx, now),
        number,
        owner_id,
        shipment_id,
        match_id: ctx.matched.id,
        created_at: now,
    };
    state.documents.insert(document.id, document.clone());

    info!(
        document_id = %document.id,
        number = %document.number,
        kind = ?kind,
        "document generated"
    );
    Ok(document)
}

pub fn owned_by(state: &AppState, owner_id: Uuid) -> Vec<GeneratedDocument> {
    let mut list: Vec<GeneratedDocument> = state
        .documents
        .iter()
        .filter(|d| d.owner_id == owner_id)
        .map(|d| d.value().clone())
        .collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    list
}

pub fn get_owned(state: &AppState, owner_id: Uuid, id: Uuid) -> Result<GeneratedDocument, AppError> {
    let document = state
        .documents
        .get(&id)
        .map(|d| d.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))?;
    if document.owner_id != owner_id {
        return Err(AppError::NotFound(format!("document {id} not found")));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_carry_kind_prefix_and_date() {
        let now = Utc::now();
        let number = document_number(DocumentKind::Invoice, now);
        assert!(number.starts_with(&format!("INV-{}-", now.format("%Y%m%d"))));
        assert_eq!(number.len(), "INV-20240101-ABCDEF".len());
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape("<b>&\"</b>"), "&lt;b&gt;&amp;&quot;&lt;/b&gt;");
    }
}
