use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::auth::otp::{self, MAX_FAILED_ATTEMPTS};
use crate::engine::notifier::{notify, template_data};
use crate::engine::pricing::{economics, proposed_price};
use crate::engine::scoring::compute_score;
use crate::error::AppError;
use crate::geo::city_matches;
use crate::models::chat::{Conversation, Message};
use crate::models::matching::{
    ALGORITHM_VERSION, Match, MatchEvent, MatchEventKind, MatchStatus, MatchingPreferences,
    ScoreBreakdown,
};
use crate::models::notification::{Channel, NotificationPriority};
use crate::models::shipment::{Shipment, ShipmentStatus, TrackingStatus};
use crate::models::trip::{Trip, TripStatus};
use crate::services::{payments, tracking};
use crate::state::AppState;

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug)]
pub struct SearchOutcome {
    pub matches: Vec<Match>,
    pub auto_accepted: Option<Match>,
}

#[derive(Debug)]
pub struct AcceptOutcome {
    pub accepted: Match,
    pub delivery_otp: String,
    pub conversation_id: Uuid,
}

struct Candidate {
    shipment: Shipment,
    trip: Trip,
    score: f64,
    breakdown: ScoreBreakdown,
}

fn load_shipment(state: &AppState, id: Uuid) -> Result<Shipment, AppError> {
    state
        .shipments
        .get(&id)
        .map(|s| s.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))
}

fn load_trip(state: &AppState, id: Uuid) -> Result<Trip, AppError> {
    state
        .trips
        .get(&id)
        .map(|t| t.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))
}

fn load_match(state: &AppState, id: Uuid) -> Result<Match, AppError> {
    state
        .matches
        .get(&id)
        .map(|m| m.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("match {id} not found")))
}

fn user_rating(state: &AppState, user_id: Uuid) -> f64 {
    state.users.get(&user_id).map(|u| u.rating).unwrap_or(0.0)
}

fn trip_is_candidate(trip: &Trip, shipment: &Shipment, now: DateTime<Utc>) -> bool {
    trip.status == TripStatus::Active
        && trip.remaining_weight >= shipment.weight
        && trip.remaining_packages > 0
        && trip.departure_date > now
        && trip.traveler_id != shipment.sender_id
        && city_matches(&trip.origin_city, &shipment.origin_city)
        && city_matches(&trip.destination_city, &shipment.destination_city)
        && trip.accepts_package_type(shipment.package_type)
        && (!shipment.is_fragile || trip.accepts_fragile)
}

fn shipment_is_candidate(shipment: &Shipment, trip: &Trip) -> bool {
    shipment.status == ShipmentStatus::Pending
        && shipment.weight <= trip.remaining_weight
        && shipment.sender_id != trip.traveler_id
        && city_matches(&shipment.origin_city, &trip.origin_city)
        && city_matches(&shipment.destination_city, &trip.destination_city)
        && trip.accepts_package_type(shipment.package_type)
        && (!shipment.is_fragile || trip.accepts_fragile)
}

fn rank(mut candidates: Vec<Candidate>, min_score: f64, limit: usize) -> Vec<Candidate> {
    candidates.retain(|c| c.score >= min_score);
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(limit);
    candidates
}

pub fn find_matches_for_shipment(
    state: &AppState,
    caller: &AuthUser,
    shipment_id: Uuid,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<SearchOutcome, AppError> {
    let started = Instant::now();
    let shipment = load_shipment(state, shipment_id)?;
    if shipment.sender_id != caller.id && !caller.is_admin() {
        return Err(AppError::Forbidden("not your shipment".to_string()));
    }
    if !shipment.can_be_matched() {
        return Err(AppError::Conflict(
            "shipment is no longer open for matching".to_string(),
        ));
    }

    let rule = state.matching_rule();
    let preferences: Option<MatchingPreferences> = state
        .preferences
        .get(&shipment.sender_id)
        .map(|p| p.value().clone());

    let candidates: Vec<Candidate> = state
        .trips
        .iter()
        .filter(|entry| trip_is_candidate(entry.value(), &shipment, now))
        .filter_map(|entry| {
            let trip = entry.value().clone();
            let rating = user_rating(state, trip.traveler_id);
            if let Some(prefs) = &preferences {
                if prefs.excludes_traveler(trip.traveler_id, rating) {
                    return None;
                }
            }
            let (score, breakdown) = compute_score(&shipment, &trip, rating, &rule.weights, now);
            Some(Candidate {
                shipment: shipment.clone(),
                trip,
                score,
                breakdown,
            })
        })
        .collect();

    let ranked = rank(candidates, rule.min_compatibility_score, limit);
    let matches = persist_candidates(state, ranked, now);

    state
        .metrics
        .scoring_latency_seconds
        .with_label_values(&["shipment"])
        .observe(started.elapsed().as_secs_f64());

    let mut auto_accepted = None;
    if rule.enable_auto_acceptance {
        let threshold = preferences
            .as_ref()
            .map(|p| p.auto_accept_threshold)
            .unwrap_or(rule.auto_acceptance_threshold);

        if let Some(best) = matches
            .iter()
            .find(|m| m.status == MatchStatus::Pending && m.compatibility_score >= threshold)
        {
            match accept(state, best.id, None, now) {
                Ok(outcome) => auto_accepted = Some(outcome.accepted),
                Err(err) => warn!(match_id = %best.id, error = %err, "auto-acceptance failed"),
            }
        }
    }

    info!(
        shipment_id = %shipment_id,
        found = matches.len(),
        auto_accepted = auto_accepted.is_some(),
        "shipment candidate search finished"
    );

    Ok(SearchOutcome {
        matches,
        auto_accepted,
    })
}

pub fn find_matches_for_trip(
    state: &AppState,
    caller: &AuthUser,
    trip_id: Uuid,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Match>, AppError> {
    let started = Instant::now();
    let trip = load_trip(state, trip_id)?;
    if trip.traveler_id != caller.id && !caller.is_admin() {
        return Err(AppError::Forbidden("not your trip".to_string()));
    }
    if trip.status != TripStatus::Active {
        return Err(AppError::Conflict("trip is not active".to_string()));
    }

    let rule = state.matching_rule();
    let rating = user_rating(state, trip.traveler_id);

    let candidates: Vec<Candidate> = state
        .shipments
        .iter()
        .filter(|entry| shipment_is_candidate(entry.value(), &trip))
        .map(|entry| {
            let shipment = entry.value().clone();
            let (score, breakdown) = compute_score(&shipment, &trip, rating, &rule.weights, now);
            Candidate {
                shipment,
                trip: trip.clone(),
                score,
                breakdown,
            }
        })
        .collect();

    let ranked = rank(candidates, rule.min_compatibility_score, limit);
    let matches = persist_candidates(state, ranked, now);

    state
        .metrics
        .scoring_latency_seconds
        .with_label_values(&["trip"])
        .observe(started.elapsed().as_secs_f64());

    info!(trip_id = %trip_id, found = matches.len(), "trip candidate search finished");
    Ok(matches)
}

fn find_pair(state: &AppState, shipment_id: Uuid, trip_id: Uuid) -> Option<Match> {
    state
        .matches
        .iter()
        .find(|m| m.shipment_id == shipment_id && m.trip_id == trip_id)
        .map(|m| m.value().clone())
}

/// Creates or refreshes one match per candidate. Settled pairs are left alone
/// and omitted from the result.
fn persist_candidates(state: &AppState, ranked: Vec<Candidate>, now: DateTime<Utc>) -> Vec<Match> {
    let expiry = Duration::hours(state.config.match_expiry_hours);
    let mut result = Vec::with_capacity(ranked.len());
    let mut created = Vec::new();

    {
        let _guard = state.transaction();
        for candidate in ranked {
            let price = proposed_price(
                &candidate.shipment,
                &candidate.trip,
                state.config.default_price_per_kg,
            );

            let persisted = match find_pair(state, candidate.shipment.id, candidate.trip.id) {
                Some(mut existing) => {
                    if !matches!(existing.status, MatchStatus::Pending | MatchStatus::Expired) {
                        continue;
                    }
                    existing.status = MatchStatus::Pending;
                    existing.compatibility_score = candidate.score;
                    existing.score_breakdown = candidate.breakdown;
                    existing.proposed_price = price;
                    existing.expires_at = now + expiry;
                    existing.updated_at = now;
                    existing
                }
                None => {
                    let fresh = Match {
                        id: Uuid::new_v4(),
                        shipment_id: candidate.shipment.id,
                        trip_id: candidate.trip.id,
                        sender_id: candidate.shipment.sender_id,
                        traveler_id: candidate.trip.traveler_id,
                        compatibility_score: candidate.score,
                        score_breakdown: candidate.breakdown,
                        proposed_price: price,
                        economics: None,
                        status: MatchStatus::Pending,
                        algorithm_version: ALGORITHM_VERSION.to_string(),
                        created_at: now,
                        updated_at: now,
                        expires_at: now + expiry,
                        responded_at: None,
                        accepted_at: None,
                        accepted_by: None,
                        rejected_at: None,
                        rejected_by: None,
                        rejection_reason: None,
                        delivery_otp_hash: None,
                        delivery_otp_generated_at: None,
                        delivery_otp_expires_at: None,
                        delivery_otp_failed_attempts: 0,
                        delivery_confirmed: false,
                        delivery_confirmed_at: None,
                        chat_room_id: None,
                        chat_activated_at: None,
                        auto_accepted: false,
                        notification_sent: true,
                        notification_sent_at: Some(now),
                    };
                    created.push((fresh.clone(), candidate.shipment, candidate.trip));
                    fresh
                }
            };

            state.matches.insert(persisted.id, persisted.clone());
            result.push(persisted);
        }
    }

    for (m, shipment, trip) in &created {
        notify_match_found(state, m, shipment, trip);
        state.metrics.record_match("created");
    }
    let created_ids: Vec<Uuid> = created.iter().map(|(m, _, _)| m.id).collect();
    for m in &result {
        let kind = if created_ids.contains(&m.id) {
            MatchEventKind::Created
        } else {
            MatchEventKind::Refreshed
        };
        state.publish(MatchEvent::of(kind, m, now));
    }

    result
}

fn wants_match_notifications(state: &AppState, user_id: Uuid) -> bool {
    state
        .preferences
        .get(&user_id)
        .map(|p| p.notify_on_match)
        .unwrap_or(true)
}

fn notify_match_found(state: &AppState, m: &Match, shipment: &Shipment, trip: &Trip) {
    let route = format!("{} → {}", trip.origin_city, trip.destination_city);
    for user_id in [m.sender_id, m.traveler_id] {
        if !wants_match_notifications(state, user_id) {
            continue;
        }
        notify(
            state,
            user_id,
            Channel::InApp,
            "match_found",
            template_data([
                ("score", format!("{:.2}", m.compatibility_score)),
                ("route", route.clone()),
                ("price", m.proposed_price.to_string()),
                ("tracking_number", shipment.tracking_number.clone()),
            ]),
            NotificationPriority::Normal,
        );
    }
}

/// Accepts a pending match. `actor` is `None` for automatic acceptance.
pub fn accept(
    state: &AppState,
    match_id: Uuid,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<AcceptOutcome, AppError> {
    let code = otp::generate_code();
    let otp_ttl = Duration::hours(state.config.delivery_otp_ttl_hours);

    let (accepted, shipment, trip, cancelled) = {
        let guard = state.transaction();
        let mut m = load_match(state, match_id)?;

        if let Some(actor) = actor {
            if !m.is_party(actor) {
                return Err(AppError::Forbidden("not a party to this match".to_string()));
            }
        }
        if m.status != MatchStatus::Pending {
            return Err(AppError::Conflict(format!(
                "match is {:?}, not pending",
                m.status
            )));
        }
        if m.is_expired(now) {
            m.status = MatchStatus::Expired;
            m.updated_at = now;
            state.matches.insert(m.id, m.clone());
            drop(guard);
            state.publish(MatchEvent::of(MatchEventKind::Expired, &m, now));
            state.metrics.record_match("expired");
            return Err(AppError::Conflict("match has expired".to_string()));
        }

        let mut shipment = load_shipment(state, m.shipment_id)?;
        if !shipment.can_be_matched() {
            return Err(AppError::Conflict(
                "shipment is no longer open for matching".to_string(),
            ));
        }
        let mut trip = load_trip(state, m.trip_id)?;
        trip.check_can_carry(&shipment, now)
            .map_err(AppError::Conflict)?;

        let commission_rate = state
            .users
            .get(&m.traveler_id)
            .map(|u| u.commission_rate)
            .unwrap_or(state.config.default_commission_rate);

        let conversation = Conversation {
            id: Uuid::new_v4(),
            match_id: m.id,
            shipment_id: shipment.id,
            sender_id: m.sender_id,
            traveler_id: m.traveler_id,
            is_active: true,
            created_at: now,
            last_message_at: Some(now),
        };
        let opening = Message::system(
            conversation.id,
            format!(
                "Match accepted for shipment {}. You can now coordinate pickup and delivery here.",
                shipment.tracking_number
            ),
            now,
        );

        // the listing may have been edited since the match was priced
        m.proposed_price = proposed_price(&shipment, &trip, state.config.default_price_per_kg);
        m.status = MatchStatus::Accepted;
        m.economics = Some(economics(&shipment, m.proposed_price, commission_rate));
        m.responded_at = Some(now);
        m.accepted_at = Some(now);
        m.accepted_by = actor;
        m.auto_accepted = actor.is_none();
        m.delivery_otp_hash = Some(otp::hash_code(&code));
        m.delivery_otp_generated_at = Some(now);
        m.delivery_otp_expires_at = Some(now + otp_ttl);
        m.delivery_otp_failed_attempts = 0;
        m.chat_room_id = Some(conversation.id);
        m.chat_activated_at = Some(now);
        m.updated_at = now;

        shipment.status = ShipmentStatus::Matched;
        shipment.matched_trip_id = Some(trip.id);
        shipment.price = Some(m.proposed_price);
        shipment.updated_at = now;

        trip.load(shipment.weight, now);

        let siblings: Vec<Match> = state
            .matches
            .iter()
            .filter(|other| {
                other.shipment_id == m.shipment_id
                    && other.id != m.id
                    && other.status == MatchStatus::Pending
            })
            .map(|other| other.value().clone())
            .collect();

        let mut cancelled = Vec::with_capacity(siblings.len());
        for mut sibling in siblings {
            sibling.status = MatchStatus::Cancelled;
            sibling.updated_at = now;
            state.matches.insert(sibling.id, sibling.clone());
            cancelled.push(sibling);
        }

        state.matches.insert(m.id, m.clone());
        state.shipments.insert(shipment.id, shipment.clone());
        state.trips.insert(trip.id, trip.clone());
        state.messages.insert(opening.id, opening);
        state.conversations.insert(conversation.id, conversation);
        tracking::record(
            state,
            shipment.id,
            TrackingStatus::Matched,
            format!("Matched with a trip departing {}", trip.departure_date.format("%Y-%m-%d")),
            None,
            actor,
            now,
        );

        (m, shipment, trip, cancelled)
    };

    for user_id in [accepted.sender_id, accepted.traveler_id] {
        notify(
            state,
            user_id,
            Channel::InApp,
            "match_accepted",
            template_data([
                ("tracking_number", shipment.tracking_number.clone()),
                ("price", accepted.proposed_price.to_string()),
            ]),
            NotificationPriority::High,
        );
    }
    send_delivery_code(state, &accepted, &shipment, &code);

    state.publish(MatchEvent::of(MatchEventKind::Accepted, &accepted, now));
    for sibling in &cancelled {
        state.publish(MatchEvent::of(MatchEventKind::Cancelled, sibling, now));
        state.metrics.record_match("cancelled");
    }
    state.metrics.record_match(if accepted.auto_accepted {
        "auto_accepted"
    } else {
        "accepted"
    });
    state
        .metrics
        .record_trip_utilization(&trip.id.to_string(), trip.utilization_rate() / 100.0);

    info!(
        match_id = %accepted.id,
        shipment_id = %accepted.shipment_id,
        trip_id = %accepted.trip_id,
        auto = accepted.auto_accepted,
        siblings_cancelled = cancelled.len(),
        "match accepted"
    );

    let conversation_id = accepted.chat_room_id.unwrap_or_default();
    Ok(AcceptOutcome {
        accepted,
        delivery_otp: code,
        conversation_id,
    })
}

fn send_delivery_code(state: &AppState, m: &Match, shipment: &Shipment, code: &str) {
    let expires_at = m
        .delivery_otp_expires_at
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();

    notify(
        state,
        m.sender_id,
        Channel::Sms,
        "delivery_otp",
        template_data([
            ("tracking_number", shipment.tracking_number.clone()),
            ("otp", code.to_string()),
            ("expires_at", expires_at),
        ]),
        NotificationPriority::High,
    );
}

pub fn reject(
    state: &AppState,
    match_id: Uuid,
    actor: Uuid,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Match, AppError> {
    let rejected = {
        let _guard = state.transaction();
        let mut m = load_match(state, match_id)?;

        if !m.is_party(actor) {
            return Err(AppError::Forbidden("not a party to this match".to_string()));
        }
        if m.status != MatchStatus::Pending {
            return Err(AppError::Conflict(format!(
                "match is {:?}, not pending",
                m.status
            )));
        }
        if m.is_expired(now) {
            return Err(AppError::Conflict("match has expired".to_string()));
        }

        m.status = MatchStatus::Rejected;
        m.responded_at = Some(now);
        m.rejected_at = Some(now);
        m.rejected_by = Some(actor);
        m.rejection_reason = reason.filter(|r| !r.trim().is_empty());
        m.updated_at = now;

        state.matches.insert(m.id, m.clone());
        m
    };

    state.publish(MatchEvent::of(MatchEventKind::Rejected, &rejected, now));
    state.metrics.record_match("rejected");
    info!(match_id = %match_id, rejected_by = %actor, "match rejected");
    Ok(rejected)
}

/// Flips overdue pending matches to expired. Returns how many changed.
pub fn expire_overdue(state: &AppState, now: DateTime<Utc>) -> usize {
    let expired: Vec<Match> = {
        let _guard = state.transaction();
        let overdue: Vec<Match> = state
            .matches
            .iter()
            .filter(|m| m.status == MatchStatus::Pending && m.is_expired(now))
            .map(|m| m.value().clone())
            .collect();

        overdue
            .into_iter()
            .map(|mut m| {
                m.status = MatchStatus::Expired;
                m.updated_at = now;
                state.matches.insert(m.id, m.clone());
                m
            })
            .collect()
    };

    for m in &expired {
        state.publish(MatchEvent::of(MatchEventKind::Expired, m, now));
        state.metrics.record_match("expired");
    }
    expired.len()
}

/// Cancels the shipment, its open matches and any escrow hold.
pub fn cancel_shipment(
    state: &AppState,
    caller: &AuthUser,
    shipment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Shipment, AppError> {
    let (shipment, cancelled, refunds) = {
        let _guard = state.transaction();
        let mut shipment = load_shipment(state, shipment_id)?;

        if shipment.sender_id != caller.id && !caller.is_admin() {
            return Err(AppError::Forbidden("not your shipment".to_string()));
        }
        if !matches!(
            shipment.status,
            ShipmentStatus::Draft | ShipmentStatus::Pending | ShipmentStatus::Matched
        ) {
            return Err(AppError::Conflict(format!(
                "shipment in status {:?} cannot be cancelled",
                shipment.status
            )));
        }

        let refund_plan = payments::plan_refund(state, &shipment, now)?;

        let open: Vec<Match> = state
            .matches
            .iter()
            .filter(|m| {
                m.shipment_id == shipment_id
                    && matches!(m.status, MatchStatus::Pending | MatchStatus::Accepted)
            })
            .map(|m| m.value().clone())
            .collect();

        let mut cancelled = Vec::with_capacity(open.len());
        for mut m in open {
            if m.status == MatchStatus::Accepted {
                if let Some(mut trip) = state.trips.get(&m.trip_id).map(|t| t.value().clone()) {
                    trip.unload(shipment.weight, now);
                    state.trips.insert(trip.id, trip);
                }
                if let Some(room) = m.chat_room_id {
                    if let Some(mut conversation) = state.conversations.get_mut(&room) {
                        conversation.is_active = false;
                    }
                }
                m.delivery_otp_hash = None;
            }
            m.status = MatchStatus::Cancelled;
            m.updated_at = now;
            state.matches.insert(m.id, m.clone());
            cancelled.push(m);
        }

        let refunds = refund_plan.transactions().len();
        refund_plan.commit(state);

        shipment.status = ShipmentStatus::Cancelled;
        shipment.is_paid = false;
        shipment.updated_at = now;
        state.shipments.insert(shipment.id, shipment.clone());
        tracking::record(
            state,
            shipment.id,
            TrackingStatus::Cancelled,
            "Shipment cancelled",
            None,
            Some(caller.id),
            now,
        );

        (shipment, cancelled, refunds)
    };

    for m in &cancelled {
        state.publish(MatchEvent::of(MatchEventKind::Cancelled, m, now));
        state.metrics.record_match("cancelled");
    }

    info!(
        shipment_id = %shipment_id,
        matches_cancelled = cancelled.len(),
        refunded = refunds > 0,
        "shipment cancelled"
    );
    Ok(shipment)
}

/// Cancels the pending matches of a trip that is being closed.
/// Caller holds the store transaction lock.
pub fn cancel_pending_for_trip(state: &AppState, trip_id: Uuid, now: DateTime<Utc>) -> Vec<Match> {
    let pending: Vec<Match> = state
        .matches
        .iter()
        .filter(|m| m.trip_id == trip_id && m.status == MatchStatus::Pending)
        .map(|m| m.value().clone())
        .collect();

    pending
        .into_iter()
        .map(|mut m| {
            m.status = MatchStatus::Cancelled;
            m.updated_at = now;
            state.matches.insert(m.id, m.clone());
            m
        })
        .collect()
}

/// Which pending matches an edit touches.
#[derive(Debug, Clone, Copy)]
pub enum PendingScope {
    Shipment(Uuid),
    Trip(Uuid),
}

#[derive(Debug, Default)]
pub struct PendingRefresh {
    pub refreshed: Vec<Match>,
    pub cancelled: Vec<Match>,
}

/// Re-scores and re-prices pending matches after their shipment or trip was
/// edited. Pairs that no longer fit, or fall below the rule's minimum score,
/// are cancelled. Caller holds the store transaction lock.
pub fn refresh_pending(state: &AppState, scope: PendingScope, now: DateTime<Utc>) -> PendingRefresh {
    let rule = state.matching_rule();
    let pending: Vec<Match> = state
        .matches
        .iter()
        .filter(|m| {
            m.status == MatchStatus::Pending
                && match scope {
                    PendingScope::Shipment(id) => m.shipment_id == id,
                    PendingScope::Trip(id) => m.trip_id == id,
                }
        })
        .map(|m| m.value().clone())
        .collect();

    let mut outcome = PendingRefresh::default();
    for mut m in pending {
        let pair = state
            .shipments
            .get(&m.shipment_id)
            .map(|s| s.value().clone())
            .zip(state.trips.get(&m.trip_id).map(|t| t.value().clone()));

        let rescored = pair.and_then(|(shipment, trip)| {
            if !shipment.can_be_matched() || !trip_is_candidate(&trip, &shipment, now) {
                return None;
            }
            let rating = user_rating(state, trip.traveler_id);
            let (score, breakdown) = compute_score(&shipment, &trip, rating, &rule.weights, now);
            (score >= rule.min_compatibility_score).then(|| {
                let price = proposed_price(&shipment, &trip, state.config.default_price_per_kg);
                (score, breakdown, price)
            })
        });

        m.updated_at = now;
        match rescored {
            Some((score, breakdown, price)) => {
                m.compatibility_score = score;
                m.score_breakdown = breakdown;
                m.proposed_price = price;
                state.matches.insert(m.id, m.clone());
                outcome.refreshed.push(m);
            }
            None => {
                m.status = MatchStatus::Cancelled;
                state.matches.insert(m.id, m.clone());
                outcome.cancelled.push(m);
            }
        }
    }
    outcome
}

/// Publishes the events of a [`refresh_pending`] pass once the lock is released.
pub fn publish_refresh(state: &AppState, refresh: &PendingRefresh, now: DateTime<Utc>) {
    for m in &refresh.refreshed {
        state.publish(MatchEvent::of(MatchEventKind::Refreshed, m, now));
    }
    for m in &refresh.cancelled {
        state.publish(MatchEvent::of(MatchEventKind::Cancelled, m, now));
        state.metrics.record_match("cancelled");
    }
}

pub fn regenerate_delivery_otp(
    state: &AppState,
    match_id: Uuid,
    actor: Uuid,
    now: DateTime<Utc>,
) -> Result<(Match, String), AppError> {
    let code = otp::generate_code();
    let otp_ttl = Duration::hours(state.config.delivery_otp_ttl_hours);

    let (m, shipment) = {
        let _guard = state.transaction();
        let mut m = load_match(state, match_id)?;
        if m.sender_id != actor {
            return Err(AppError::Forbidden(
                "only the sender can request a new delivery code".to_string(),
            ));
        }
        if !m.can_confirm_delivery() {
            return Err(AppError::Conflict(
                "match is not awaiting delivery".to_string(),
            ));
        }
        let shipment = load_shipment(state, m.shipment_id)?;

        m.delivery_otp_hash = Some(otp::hash_code(&code));
        m.delivery_otp_generated_at = Some(now);
        m.delivery_otp_expires_at = Some(now + otp_ttl);
        m.delivery_otp_failed_attempts = 0;
        m.updated_at = now;
        state.matches.insert(m.id, m.clone());
        (m, shipment)
    };

    send_delivery_code(state, &m, &shipment, &code);
    info!(match_id = %match_id, "delivery code regenerated");
    Ok((m, code))
}

/// Traveler submits the recipient's code. On success the shipment is
/// delivered and escrow is settled.
pub fn confirm_delivery(
    state: &AppState,
    match_id: Uuid,
    actor: Uuid,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Match, AppError> {
    let (m, shipment) = {
        let _guard = state.transaction();
        let mut m = load_match(state, match_id)?;

        if m.traveler_id != actor {
            return Err(AppError::Forbidden(
                "only the traveler can confirm delivery".to_string(),
            ));
        }
        if !m.can_confirm_delivery() {
            return Err(AppError::Conflict(
                "match is not awaiting delivery".to_string(),
            ));
        }
        if m.delivery_otp_failed_attempts >= MAX_FAILED_ATTEMPTS {
            return Err(AppError::RateLimited(
                "too many wrong codes; the sender must issue a new one".to_string(),
            ));
        }
        let Some(stored) = m.delivery_otp_hash.clone() else {
            return Err(AppError::BadRequest(
                "no delivery code is active; the sender must issue a new one".to_string(),
            ));
        };
        if m.delivery_otp_expires_at.is_some_and(|at| now >= at) {
            return Err(AppError::BadRequest("delivery code has expired".to_string()));
        }

        if !otp::verify_code(code, &stored) {
            m.delivery_otp_failed_attempts += 1;
            m.updated_at = now;
            let burned = m.delivery_otp_failed_attempts >= MAX_FAILED_ATTEMPTS;
            if burned {
                m.delivery_otp_hash = None;
            }
            state.matches.insert(m.id, m.clone());
            warn!(
                match_id = %match_id,
                failed_attempts = m.delivery_otp_failed_attempts,
                "wrong delivery code"
            );
            return Err(if burned {
                AppError::RateLimited(
                    "too many wrong codes; the sender must issue a new one".to_string(),
                )
            } else {
                AppError::BadRequest("invalid delivery code".to_string())
            });
        }

        let mut shipment = load_shipment(state, m.shipment_id)?;
        let settlement = payments::plan_delivery_settlement(state, &shipment, &m, now)?;

        m.delivery_confirmed = true;
        m.delivery_confirmed_at = Some(now);
        m.delivery_otp_hash = None;
        m.updated_at = now;

        shipment.status = ShipmentStatus::Delivered;
        shipment.updated_at = now;

        if let Some(mut sender) = state.users.get_mut(&m.sender_id) {
            sender.total_shipments += 1;
        }
        if let Some(mut traveler) = state.users.get_mut(&m.traveler_id) {
            traveler.total_trips += 1;
        }

        settlement.commit(state);
        state.matches.insert(m.id, m.clone());
        state.shipments.insert(shipment.id, shipment.clone());
        tracking::record(
            state,
            shipment.id,
            TrackingStatus::Delivered,
            "Delivery confirmed with the recipient's code",
            Some(shipment.destination_city.clone()),
            Some(actor),
            now,
        );

        (m, shipment)
    };

    for user_id in [m.sender_id, m.traveler_id] {
        notify(
            state,
            user_id,
            Channel::InApp,
            "delivery_confirmed",
            template_data([
                ("tracking_number", shipment.tracking_number.clone()),
                ("delivered_at", now.format("%Y-%m-%d %H:%M UTC").to_string()),
            ]),
            NotificationPriority::High,
        );
    }
    state.publish(MatchEvent::of(MatchEventKind::Delivered, &m, now));
    state.metrics.deliveries_confirmed_total.inc();

    info!(match_id = %match_id, shipment_id = %shipment.id, "delivery confirmed");
    Ok(m)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::config::Config;
    use crate::models::shipment::{PackageType, Urgency};
    use crate::models::i18n::Language;
    use crate::models::user::{Role, User};

    fn state() -> AppState {
        AppState::new(Config::default()).0
    }

    fn add_user(state: &AppState, role: Role, rating: f64) -> AuthUser {
        let now = Utc::now();
        let id = Uuid::new_v4();
        state.users.insert(
            id,
            User {
                id,
                username: format!("user-{id}"),
                email: format!("{id}@example.com"),
                password_hash: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                phone_number: None,
                role,
                is_phone_verified: false,
                is_document_verified: false,
                is_active: true,
                rating,
                total_trips: 0,
                total_shipments: 0,
                commission_rate: Decimal::new(25, 0),
                preferred_language: Language::Fr,
                fallback_language: Language::En,
                created_at: now,
                updated_at: now,
            },
        );
        AuthUser { id, role }
    }

    fn add_shipment(state: &AppState, sender: Uuid, weight: f64) -> Shipment {
        let now = Utc::now();
        let shipment = Shipment {
            id: Uuid::new_v4(),
            tracking_number: Shipment::generate_tracking_number(),
            sender_id: sender,
            package_type: PackageType::Clothing,
            description: "winter clothes".to_string(),
            weight,
            value: Decimal::new(10_000, 0),
            is_fragile: false,
            origin_city: "Alger".to_string(),
            origin_address: "Bab Ezzouar".to_string(),
            destination_city: "Paris".to_string(),
            destination_country: "France".to_string(),
            destination_address: "Belleville".to_string(),
            recipient_name: "Yacine".to_string(),
            recipient_phone: "+33612345678".to_string(),
            preferred_pickup_date: now,
            max_delivery_date: now + Duration::days(14),
            urgency: Urgency::Medium,
            status: ShipmentStatus::Pending,
            matched_trip_id: None,
            price: None,
            is_paid: false,
            payment_method: None,
            special_instructions: String::new(),
            created_at: now,
            updated_at: now,
        };
        state.shipments.insert(shipment.id, shipment.clone());
        shipment
    }

    fn add_trip(state: &AppState, traveler: Uuid, max_weight: f64, max_packages: u32) -> Trip {
        let now = Utc::now();
        let trip = Trip {
            id: Uuid::new_v4(),
            traveler_id: traveler,
            origin_city: "Alger".to_string(),
            origin_country: "Algeria".to_string(),
            destination_city: "Paris".to_string(),
            destination_country: "France".to_string(),
            departure_date: now + Duration::days(3),
            arrival_date: now + Duration::days(3) + Duration::hours(3),
            flexible_dates: false,
            flexibility_days: 0,
            max_weight,
            remaining_weight: max_weight,
            max_packages,
            remaining_packages: max_packages,
            accepted_package_types: Vec::new(),
            min_price_per_kg: Decimal::new(1000, 0),
            accepts_fragile: true,
            status: TripStatus::Active,
            is_verified: false,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        };
        state.trips.insert(trip.id, trip.clone());
        trip
    }

    #[test]
    fn search_creates_pending_matches_sorted_by_score() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let good = add_user(&state, Role::Traveler, 5.0);
        let average = add_user(&state, Role::Traveler, 1.0);
        let shipment = add_shipment(&state, sender.id, 2.0);
        add_trip(&state, good.id, 20.0, 3);
        add_trip(&state, average.id, 20.0, 3);

        let outcome =
            find_matches_for_shipment(&state, &sender, shipment.id, DEFAULT_LIMIT, Utc::now())
                .unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].traveler_id, good.id);
        assert!(outcome.matches[0].compatibility_score >= outcome.matches[1].compatibility_score);
        assert!(outcome.matches.iter().all(|m| m.status == MatchStatus::Pending));
        assert!(outcome.auto_accepted.is_none());
    }

    #[test]
    fn repeated_search_refreshes_instead_of_duplicating() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 4.0);
        let shipment = add_shipment(&state, sender.id, 2.0);
        add_trip(&state, traveler.id, 20.0, 3);

        let now = Utc::now();
        let first = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let second = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();

        assert_eq!(state.matches.len(), 1);
        assert_eq!(first.matches[0].id, second.matches[0].id);
    }

    #[test]
    fn own_trip_and_blacklisted_traveler_are_skipped() {
        let state = state();
        let both = add_user(&state, Role::Both, 5.0);
        let blocked = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, both.id, 2.0);
        add_trip(&state, both.id, 20.0, 3);
        add_trip(&state, blocked.id, 20.0, 3);

        let mut prefs = MatchingPreferences::defaults_for(both.id);
        prefs.blacklisted_users.push(blocked.id);
        state.preferences.insert(both.id, prefs);

        let outcome = find_matches_for_shipment(&state, &both, shipment.id, 10, Utc::now()).unwrap();
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn accept_updates_shipment_trip_siblings_and_opens_chat() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let t1 = add_user(&state, Role::Traveler, 5.0);
        let t2 = add_user(&state, Role::Traveler, 4.0);
        let shipment = add_shipment(&state, sender.id, 4.0);
        let trip = add_trip(&state, t1.id, 10.0, 1);
        add_trip(&state, t2.id, 10.0, 1);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let chosen = found.matches.iter().find(|m| m.trip_id == trip.id).unwrap().clone();

        let outcome = accept(&state, chosen.id, Some(t1.id), now).unwrap();
        let accepted = outcome.accepted;

        assert_eq!(accepted.status, MatchStatus::Accepted);
        assert_eq!(accepted.accepted_by, Some(t1.id));
        assert_eq!(outcome.delivery_otp.len(), 6);
        assert!(accepted.delivery_otp_hash.is_some());
        assert!(state.conversations.contains_key(&outcome.conversation_id));

        let economics = accepted.economics.clone().unwrap();
        assert_eq!(economics.price, accepted.proposed_price);

        let shipment = state.shipments.get(&shipment.id).unwrap().clone();
        assert_eq!(shipment.status, ShipmentStatus::Matched);
        assert_eq!(shipment.matched_trip_id, Some(trip.id));

        let trip = state.trips.get(&trip.id).unwrap().clone();
        assert_eq!(trip.remaining_weight, 6.0);
        assert_eq!(trip.remaining_packages, 0);
        assert_eq!(trip.status, TripStatus::InProgress);

        let others: Vec<MatchStatus> = state
            .matches
            .iter()
            .filter(|m| m.id != accepted.id)
            .map(|m| m.status)
            .collect();
        assert_eq!(others, vec![MatchStatus::Cancelled]);
    }

    #[test]
    fn expired_match_cannot_be_accepted() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let later = now + Duration::hours(25);

        let err = accept(&state, found.matches[0].id, Some(sender.id), later).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            state.matches.get(&found.matches[0].id).unwrap().status,
            MatchStatus::Expired
        );
    }

    #[test]
    fn outsider_cannot_accept_or_reject() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let outsider = add_user(&state, Role::Both, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let id = found.matches[0].id;

        assert!(matches!(accept(&state, id, Some(outsider.id), now), Err(AppError::Forbidden(_))));
        assert!(matches!(
            reject(&state, id, outsider.id, None, now),
            Err(AppError::Forbidden(_))
        ));

        let rejected = reject(&state, id, traveler.id, Some("too heavy".to_string()), now).unwrap();
        assert_eq!(rejected.status, MatchStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("too heavy"));
    }

    #[test]
    fn auto_acceptance_accepts_best_match_above_threshold() {
        let state = state();
        let mut rule = state.matching_rule();
        rule.enable_auto_acceptance = true;
        rule.auto_acceptance_threshold = 50.0;
        state.set_matching_rule(rule);

        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let outcome = find_matches_for_shipment(&state, &sender, shipment.id, 10, Utc::now()).unwrap();
        let auto = outcome.auto_accepted.unwrap();
        assert!(auto.auto_accepted);
        assert_eq!(auto.accepted_by, None);
        assert_eq!(
            state.shipments.get(&shipment.id).unwrap().status,
            ShipmentStatus::Matched
        );
    }

    #[test]
    fn delivery_confirmation_counts_wrong_codes_then_succeeds() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let outcome = accept(&state, found.matches[0].id, Some(sender.id), now).unwrap();
        let id = outcome.accepted.id;
        let wrong = if outcome.delivery_otp == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            confirm_delivery(&state, id, sender.id, &outcome.delivery_otp, now),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            confirm_delivery(&state, id, traveler.id, wrong, now),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(state.matches.get(&id).unwrap().delivery_otp_failed_attempts, 1);

        let confirmed = confirm_delivery(&state, id, traveler.id, &outcome.delivery_otp, now).unwrap();
        assert!(confirmed.delivery_confirmed);
        assert_eq!(
            state.shipments.get(&shipment.id).unwrap().status,
            ShipmentStatus::Delivered
        );
        assert_eq!(state.users.get(&sender.id).unwrap().total_shipments, 1);
        assert_eq!(state.users.get(&traveler.id).unwrap().total_trips, 1);
    }

    #[test]
    fn code_burns_after_five_failures() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let outcome = accept(&state, found.matches[0].id, Some(sender.id), now).unwrap();
        let id = outcome.accepted.id;
        let wrong = if outcome.delivery_otp == "000000" { "111111" } else { "000000" };

        for _ in 0..4 {
            assert!(matches!(
                confirm_delivery(&state, id, traveler.id, wrong, now),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(matches!(
            confirm_delivery(&state, id, traveler.id, wrong, now),
            Err(AppError::RateLimited(_))
        ));
        assert!(matches!(
            confirm_delivery(&state, id, traveler.id, &outcome.delivery_otp, now),
            Err(AppError::RateLimited(_))
        ));

        let (_, fresh) = regenerate_delivery_otp(&state, id, sender.id, now).unwrap();
        assert!(confirm_delivery(&state, id, traveler.id, &fresh, now).is_ok());
    }

    #[test]
    fn expired_delivery_code_is_rejected_until_regenerated() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let outcome = accept(&state, found.matches[0].id, Some(sender.id), now).unwrap();
        let id = outcome.accepted.id;

        let later = now + Duration::hours(state.config.delivery_otp_ttl_hours) + Duration::minutes(1);
        assert!(matches!(
            confirm_delivery(&state, id, traveler.id, &outcome.delivery_otp, later),
            Err(AppError::BadRequest(_))
        ));
        let stored = state.matches.get(&id).unwrap().clone();
        assert!(!stored.delivery_confirmed);
        assert_eq!(stored.delivery_otp_failed_attempts, 0);

        let (_, fresh) = regenerate_delivery_otp(&state, id, sender.id, later).unwrap();
        assert!(confirm_delivery(&state, id, traveler.id, &fresh, later).is_ok());
    }

    #[test]
    fn shipment_edit_reprices_pending_match_and_accept_loads_new_weight() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 2.0);
        let trip = add_trip(&state, traveler.id, 20.0, 3);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let id = found.matches[0].id;
        assert_eq!(found.matches[0].proposed_price, Decimal::new(2200, 0));

        let refresh = {
            let _guard = state.transaction();
            let mut edited = state.shipments.get(&shipment.id).unwrap().clone();
            edited.weight = 18.0;
            state.shipments.insert(edited.id, edited);
            refresh_pending(&state, PendingScope::Shipment(shipment.id), now)
        };
        assert_eq!(refresh.refreshed.len(), 1);
        assert!(refresh.cancelled.is_empty());
        assert_eq!(
            state.matches.get(&id).unwrap().proposed_price,
            Decimal::new(19_800, 0)
        );

        let outcome = accept(&state, id, Some(sender.id), now).unwrap();
        assert_eq!(outcome.accepted.proposed_price, Decimal::new(19_800, 0));
        assert_eq!(
            state.shipments.get(&shipment.id).unwrap().price,
            Some(Decimal::new(19_800, 0))
        );
        assert_eq!(state.trips.get(&trip.id).unwrap().remaining_weight, 2.0);
    }

    #[test]
    fn accept_prices_from_current_listing() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 2.0);
        add_trip(&state, traveler.id, 20.0, 3);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        if let Some(mut stored) = state.shipments.get_mut(&shipment.id) {
            stored.weight = 4.0;
            stored.urgency = Urgency::Urgent;
        }

        let outcome = accept(&state, found.matches[0].id, Some(sender.id), now).unwrap();
        assert_eq!(outcome.accepted.proposed_price, Decimal::new(6000, 0));
    }

    #[test]
    fn trip_edit_cancels_pending_matches_it_can_no_longer_carry() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let mut shipment = add_shipment(&state, sender.id, 2.0);
        shipment.is_fragile = true;
        state.shipments.insert(shipment.id, shipment.clone());
        let trip = add_trip(&state, traveler.id, 20.0, 3);

        let now = Utc::now();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let id = found.matches[0].id;

        let refresh = {
            let _guard = state.transaction();
            let mut edited = state.trips.get(&trip.id).unwrap().clone();
            edited.accepts_fragile = false;
            state.trips.insert(edited.id, edited);
            refresh_pending(&state, PendingScope::Trip(trip.id), now)
        };
        assert_eq!(refresh.cancelled.len(), 1);
        assert_eq!(state.matches.get(&id).unwrap().status, MatchStatus::Cancelled);
        assert!(matches!(
            accept(&state, id, Some(sender.id), now),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn trip_that_already_departed_today_is_not_offered() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        let mut trip = add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        trip.departure_date = now - Duration::seconds(1);
        trip.arrival_date = now + Duration::hours(3);
        state.trips.insert(trip.id, trip);

        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        assert!(found.matches.is_empty());
    }

    #[test]
    fn paid_delivery_settles_escrow() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 2.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        payments::deposit(&state, sender.id, Decimal::new(50_000, 0), "visa", now).unwrap();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        let outcome = accept(&state, found.matches[0].id, Some(sender.id), now).unwrap();
        payments::pay_for_shipment(&state, sender.id, shipment.id, now).unwrap();

        let price = outcome.accepted.proposed_price;
        let held = payments::wallet_snapshot(&state, sender.id);
        assert_eq!(held.pending_balance, price);

        confirm_delivery(&state, outcome.accepted.id, traveler.id, &outcome.delivery_otp, now)
            .unwrap();

        let sender_wallet = payments::wallet_snapshot(&state, sender.id);
        assert_eq!(sender_wallet.pending_balance, Decimal::ZERO);
        assert_eq!(sender_wallet.balance, Decimal::new(50_000, 0) - price);

        let earnings = outcome.accepted.economics.unwrap().traveler_earnings;
        let traveler_wallet = payments::wallet_snapshot(&state, traveler.id);
        assert_eq!(traveler_wallet.balance, earnings);
        assert_eq!(traveler_wallet.total_earned, earnings);
    }

    #[test]
    fn cancelling_matched_shipment_restores_capacity_and_refunds() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 2.0);
        let trip = add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        payments::deposit(&state, sender.id, Decimal::new(50_000, 0), "visa", now).unwrap();
        let found = find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();
        accept(&state, found.matches[0].id, Some(sender.id), now).unwrap();
        payments::pay_for_shipment(&state, sender.id, shipment.id, now).unwrap();

        let cancelled = cancel_shipment(&state, &sender, shipment.id, now).unwrap();
        assert_eq!(cancelled.status, ShipmentStatus::Cancelled);

        let trip = state.trips.get(&trip.id).unwrap().clone();
        assert_eq!(trip.remaining_weight, 10.0);
        assert_eq!(trip.remaining_packages, 2);

        let wallet = payments::wallet_snapshot(&state, sender.id);
        assert_eq!(wallet.pending_balance, Decimal::ZERO);
        assert_eq!(wallet.available(), Decimal::new(50_000, 0));
    }

    #[test]
    fn sweeper_expires_overdue_pending_matches() {
        let state = state();
        let sender = add_user(&state, Role::Sender, 0.0);
        let traveler = add_user(&state, Role::Traveler, 5.0);
        let shipment = add_shipment(&state, sender.id, 1.0);
        add_trip(&state, traveler.id, 10.0, 2);

        let now = Utc::now();
        find_matches_for_shipment(&state, &sender, shipment.id, 10, now).unwrap();

        assert_eq!(expire_overdue(&state, now), 0);
        assert_eq!(expire_overdue(&state, now + Duration::hours(25)), 1);
    }
}
