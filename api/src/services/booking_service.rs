use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::booking::availability::{self, check_range, claim_window};
use crate::booking::payment::{self, PaymentOutcome};
use crate::booking::schedule::SlotPlan;
use crate::booking::validation::validate_booking_dates;
use crate::error::{BookingError, Result};
use crate::models::booking::{
    generate_reference, BookingStatus, CancellationReason, NewBookingRequest, PaymentRequest,
    PaymentStatus, StatusChange, VenueBooking,
};
use crate::models::slot::DayAvailability;
use crate::models::venue::{NewVenue, Venue};
use crate::repository::BookingStore;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub cancelled_overdue: usize,
    pub completed: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn touched(&self) -> usize {
        self.expired + self.cancelled_overdue + self.completed
    }
}

/// Booking workflow on top of a [`BookingStore`].
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        BookingService { store }
    }

    pub async fn create_venue(
        &self,
        owner_id: &str,
        new_venue: NewVenue,
        now: DateTime<Utc>,
    ) -> Result<Venue> {
        new_venue.validate()?;
        let venue = new_venue.into_venue(Uuid::new_v4().to_string(), owner_id, now);
        self.store.insert_venue(&venue).await?;
        info!(venue_id = %venue.id, owner_id, "venue created");
        Ok(venue)
    }

    pub async fn get_venue(&self, venue_id: &str) -> Result<Venue> {
        self.store
            .find_venue(venue_id)
            .await?
            .ok_or_else(|| BookingError::not_found("venue", venue_id))
    }

    pub async fn list_venues(&self) -> Result<Vec<Venue>> {
        self.store.list_venues().await
    }

    pub async fn availability(
        &self,
        venue_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayAvailability>> {
        check_range(from, to)?;
        let venue = self.get_venue(venue_id).await?;
        let (start, end) = claim_window(from, to, &venue.policy);
        let slots = self.store.slots_between(venue_id, start, end).await?;
        Ok(availability::day_availability(&venue.policy, from, to, &slots))
    }

    pub async fn request_booking(
        &self,
        customer_id: &str,
        request: NewBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<VenueBooking> {
        let venue = self.get_venue(&request.venue_id).await?;
        let plan = validate_booking_dates(&request.dates, &venue.policy, now.naive_utc())?;

        let (hold_start, hold_end) = plan.hold_range();
        let held = self.store.slots_between(&venue.id, hold_start, hold_end).await?;
        if let Some(hour) = plan.collides_with_slots(&held) {
            return Err(BookingError::SlotConflict(format!(
                "{} is already booked",
                hour.format("%Y-%m-%d %H:00")
            )));
        }

        let quote = payment::quote(&venue, &plan)?;
        let status = if venue.policy.requires_approval {
            BookingStatus::Pending
        } else {
            BookingStatus::Approved
        };
        let mut booking = VenueBooking {
            id: Uuid::new_v4().to_string(),
            reference: generate_reference(),
            venue_id: venue.id.clone(),
            event_id: request.event_id,
            customer_id: customer_id.to_string(),
            dates: request.dates,
            starts_at: plan.starts_at(),
            ends_at: plan.ends_at(),
            status,
            payment_status: PaymentStatus::Unpaid,
            cancellation: None,
            total_cents: quote.total_cents,
            deposit_cents: quote.deposit_cents,
            paid_cents: 0,
            refunded_cents: 0,
            payments: Vec::new(),
            deposit_due_at: None,
            balance_due_at: payment::balance_due_at(plan.starts_at(), &venue.policy),
            history: vec![StatusChange { from: None, to: status, at: now, note: None }],
            version: 0,
            created_at: now,
            updated_at: now,
        };
        if status == BookingStatus::Approved {
            booking.deposit_due_at = Some(deposit_deadline(&booking, &venue, now));
        }

        // Nothing to pay up front: confirm straight away. The claim happens
        // before the insert so a lost race leaves no orphan booking behind.
        let confirm_now =
            status == BookingStatus::Approved && confirms_without_payment(&booking, now);
        if confirm_now {
            self.claim(&booking, &plan).await?;
            booking.transition(BookingStatus::Confirmed, now, Some("no deposit required".into()))?;
        }

        if let Err(e) = self.store.insert_booking(&booking).await {
            if confirm_now {
                self.release(&booking).await;
            }
            return Err(e);
        }
        info!(
            booking_id = %booking.id,
            venue_id = %booking.venue_id,
            reference = %booking.reference,
            status = %booking.status,
            total_cents = booking.total_cents,
            "booking requested"
        );

        if confirm_now {
            self.cancel_superseded(&booking, &venue, &plan, now).await;
        }
        Ok(booking)
    }

    pub async fn get_booking(&self, booking_id: &str, user_id: &str) -> Result<VenueBooking> {
        let booking = self.load_booking(booking_id).await?;
        if booking.customer_id == user_id {
            return Ok(booking);
        }
        let venue = self.get_venue(&booking.venue_id).await?;
        if venue.owner_id == user_id {
            return Ok(booking);
        }
        Err(BookingError::Forbidden("not your booking".to_string()))
    }

    pub async fn customer_bookings(&self, customer_id: &str) -> Result<Vec<VenueBooking>> {
        self.store.bookings_for_customer(customer_id).await
    }

    pub async fn venue_bookings(&self, venue_id: &str, owner_id: &str) -> Result<Vec<VenueBooking>> {
        let venue = self.get_venue(venue_id).await?;
        ensure_owner(&venue, owner_id)?;
        self.store.bookings_for_venue(venue_id, &[]).await
    }

    pub async fn approve(
        &self,
        booking_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VenueBooking> {
        let mut booking = self.load_booking(booking_id).await?;
        let venue = self.get_venue(&booking.venue_id).await?;
        ensure_owner(&venue, owner_id)?;

        booking.transition(BookingStatus::Approved, now, None)?;
        booking.deposit_due_at = Some(deposit_deadline(&booking, &venue, now));

        if !confirms_without_payment(&booking, now) {
            self.store.update_booking(&mut booking).await?;
            log_transition(&booking, BookingStatus::Pending);
            return Ok(booking);
        }

        let plan = SlotPlan::build(&booking.dates, &venue.policy)?;
        self.claim(&booking, &plan).await?;
        booking.transition(BookingStatus::Confirmed, now, Some("no deposit required".into()))?;
        if let Err(e) = self.store.update_booking(&mut booking).await {
            self.release(&booking).await;
            return Err(e);
        }
        log_transition(&booking, BookingStatus::Pending);
        self.cancel_superseded(&booking, &venue, &plan, now).await;
        Ok(booking)
    }

    pub async fn reject(
        &self,
        booking_id: &str,
        owner_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<VenueBooking> {
        let mut booking = self.load_booking(booking_id).await?;
        let venue = self.get_venue(&booking.venue_id).await?;
        ensure_owner(&venue, owner_id)?;

        let from = booking.status;
        booking.transition(BookingStatus::Rejected, now, note)?;
        self.store.update_booking(&mut booking).await?;
        log_transition(&booking, from);
        Ok(booking)
    }

    pub async fn record_payment(
        &self,
        booking_id: &str,
        payer_id: &str,
        request: PaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<VenueBooking> {
        let mut booking = self.load_booking(booking_id).await?;
        if booking.customer_id != payer_id {
            return Err(BookingError::Forbidden(
                "only the customer can pay for a booking".to_string(),
            ));
        }
        let venue = self.get_venue(&booking.venue_id).await?;

        let outcome = payment::apply_payment(&mut booking, &request, now)?;
        if outcome == PaymentOutcome::Replayed {
            info!(booking_id, reference = %request.reference, "payment replay ignored");
            return Ok(booking);
        }

        let mut plan = None;
        if outcome == PaymentOutcome::DepositSettled {
            let slot_plan = SlotPlan::build(&booking.dates, &venue.policy)?;
            if let Err(e) = self.claim(&booking, &slot_plan).await {
                return self.settle_race(booking_id, &request.reference, e).await;
            }
            booking.transition(BookingStatus::Confirmed, now, Some(request.reference.clone()))?;
            plan = Some(slot_plan);
        }

        if let Err(e) = self.store.update_booking(&mut booking).await {
            if plan.is_some() {
                self.release(&booking).await;
            }
            return self.settle_race(booking_id, &request.reference, e).await;
        }

        info!(
            booking_id,
            reference = %request.reference,
            amount_cents = request.amount_cents,
            paid_cents = booking.paid_cents,
            payment_status = ?booking.payment_status,
            "payment recorded"
        );
        if let Some(plan) = plan {
            log_transition(&booking, BookingStatus::Approved);
            self.cancel_superseded(&booking, &venue, &plan, now).await;
        }
        Ok(booking)
    }

    pub async fn cancel(
        &self,
        booking_id: &str,
        actor_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<VenueBooking> {
        let booking = self.load_booking(booking_id).await?;
        let venue = self.get_venue(&booking.venue_id).await?;
        let reason = if booking.customer_id == actor_id {
            CancellationReason::RequestedByCustomer
        } else if venue.owner_id == actor_id {
            CancellationReason::RequestedByOwner
        } else {
            return Err(BookingError::Forbidden("not your booking".to_string()));
        };
        self.cancel_with(booking, &venue, reason, note, now).await
    }

    /// Pending/approved bookings that will never be confirmed in time.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let candidates = self
            .store
            .bookings_with_status(&[BookingStatus::Pending, BookingStatus::Approved])
            .await?;
        for mut booking in candidates {
            let started = booking.starts_at <= now.naive_utc();
            let deposit_lapsed = booking.status == BookingStatus::Approved
                && booking.deposit_due_at.map_or(false, |due| due <= now);
            if !started && !deposit_lapsed {
                continue;
            }
            let from = booking.status;
            let note = if started { "start passed" } else { "deposit not received in time" };
            let result = match booking.transition(BookingStatus::Expired, now, Some(note.into())) {
                Ok(()) => self.store.update_booking(&mut booking).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    log_transition(&booking, from);
                    report.expired += 1;
                }
                Err(e) => {
                    warn!(booking_id = %booking.id, error = %e, "could not expire booking");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Confirmed bookings whose balance deadline passed without full payment.
    pub async fn cancel_overdue(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let confirmed = self.store.bookings_with_status(&[BookingStatus::Confirmed]).await?;
        for booking in confirmed {
            if booking.outstanding_cents() == 0 || now < booking.balance_due_at {
                continue;
            }
            let booking_id = booking.id.clone();
            let result = match self.get_venue(&booking.venue_id).await {
                Ok(venue) => {
                    self.cancel_with(
                        booking,
                        &venue,
                        CancellationReason::BalanceOverdue,
                        Some("balance not received by the due date".into()),
                        now,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(_) => report.cancelled_overdue += 1,
                Err(e) => {
                    warn!(booking_id = %booking_id, error = %e, "could not cancel overdue booking");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn complete_finished(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let confirmed = self.store.bookings_with_status(&[BookingStatus::Confirmed]).await?;
        for mut booking in confirmed {
            if booking.ends_at > now.naive_utc() || booking.payment_status != PaymentStatus::FullyPaid {
                continue;
            }
            let result = match booking.transition(BookingStatus::Completed, now, None) {
                Ok(()) => self.store.update_booking(&mut booking).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    log_transition(&booking, BookingStatus::Confirmed);
                    report.completed += 1;
                }
                Err(e) => {
                    warn!(booking_id = %booking.id, error = %e, "could not complete booking");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// One scheduler pass. Overdue cancellation runs before completion so an
    /// unpaid booking is never marked completed.
    pub async fn run_sweeps(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.expire_stale(now).await?;
        let overdue = self.cancel_overdue(now).await?;
        let completed = self.complete_finished(now).await?;
        Ok(SweepReport {
            expired: expired.expired,
            cancelled_overdue: overdue.cancelled_overdue,
            completed: completed.completed,
            failed: expired.failed + overdue.failed + completed.failed,
        })
    }

    async fn load_booking(&self, booking_id: &str) -> Result<VenueBooking> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    async fn claim(&self, booking: &VenueBooking, plan: &SlotPlan) -> Result<()> {
        let claim_id = Uuid::new_v4().to_string();
        self.store
            .claim_slots(&plan.to_slots(&booking.venue_id, &booking.id, &claim_id))
            .await
    }

    async fn release(&self, booking: &VenueBooking) {
        match self.store.release_slots(&booking.id).await {
            Ok(released) => info!(booking_id = %booking.id, released, "slots released"),
            Err(e) => warn!(booking_id = %booking.id, error = %e, "could not release slots"),
        }
    }

    /// A claim or write lost against a concurrent request. If that request
    /// was the same payment, answer with the stored result instead of an error.
    async fn settle_race(
        &self,
        booking_id: &str,
        reference: &str,
        err: BookingError,
    ) -> Result<VenueBooking> {
        if let Ok(current) = self.load_booking(booking_id).await {
            if current.has_payment(reference.trim()) {
                info!(booking_id, reference, "concurrent payment replay resolved");
                return Ok(current);
            }
        }
        warn!(booking_id, reference, error = %err, "payment not applied");
        Err(err)
    }

    async fn cancel_with(
        &self,
        mut booking: VenueBooking,
        venue: &Venue,
        reason: CancellationReason,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<VenueBooking> {
        let from = booking.status;
        booking.transition(BookingStatus::Cancelled, now, note)?;
        booking.cancellation = Some(reason);
        let refund = payment::refund_due(&booking, &venue.policy, reason, now);
        payment::record_refund(&mut booking, refund, now);

        self.store.update_booking(&mut booking).await?;
        if from.holds_claims() {
            self.release(&booking).await;
        }
        info!(
            booking_id = %booking.id,
            venue_id = %booking.venue_id,
            from = %from,
            to = %booking.status,
            reason = ?reason,
            refund_cents = refund,
            "booking cancelled"
        );
        Ok(booking)
    }

    /// Cancels competing requests that can no longer be honoured once
    /// `confirmed` holds the venue.
    async fn cancel_superseded(
        &self,
        confirmed: &VenueBooking,
        venue: &Venue,
        plan: &SlotPlan,
        now: DateTime<Utc>,
    ) {
        let competing = match self
            .store
            .bookings_for_venue(&venue.id, &[BookingStatus::Pending, BookingStatus::Approved])
            .await
        {
            Ok(bookings) => bookings,
            Err(e) => {
                warn!(venue_id = %venue.id, error = %e, "could not load competing bookings");
                return;
            }
        };

        for other in competing.into_iter().filter(|b| b.id != confirmed.id) {
            let collides = SlotPlan::build(&other.dates, &venue.policy)
                .map(|p| p.collides(plan))
                .unwrap_or(false);
            if !collides {
                continue;
            }
            let other_id = other.id.clone();
            let note = Some(format!("venue taken by {}", confirmed.reference));
            if let Err(e) = self
                .cancel_with(other, venue, CancellationReason::Superseded, note, now)
                .await
            {
                warn!(booking_id = %other_id, error = %e, "could not cancel superseded booking");
            }
        }
    }
}

fn ensure_owner(venue: &Venue, user_id: &str) -> Result<()> {
    if venue.owner_id != user_id {
        return Err(BookingError::Forbidden(format!(
            "only the owner of venue {} may do this",
            venue.id
        )));
    }
    Ok(())
}

/// Zero-deposit bookings confirm on approval, unless the balance is already
/// due. Then the full amount has to be paid first.
fn confirms_without_payment(booking: &VenueBooking, now: DateTime<Utc>) -> bool {
    booking.deposit_cents == 0 && now < booking.balance_due_at
}

fn deposit_deadline(booking: &VenueBooking, venue: &Venue, now: DateTime<Utc>) -> DateTime<Utc> {
    let window = now + Duration::hours(i64::from(venue.policy.deposit_window_hours));
    window.min(booking.starts_at.and_utc())
}

fn log_transition(booking: &VenueBooking, from: BookingStatus) {
    info!(
        booking_id = %booking.id,
        venue_id = %booking.venue_id,
        from = %from,
        to = %booking.status,
        "booking status changed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{BookingDate, PaymentKind};
    use crate::models::slot::Availability;
    use crate::models::venue::{BookingMode, BookingPolicy};
    use crate::repository::MemoryStore;
    use chrono::TimeZone;

    const OWNER: &str = "owner-1";
    const ALICE: &str = "alice";
    const BOB: &str = "bob";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    fn june(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
    }

    async fn setup(policy: BookingPolicy) -> (BookingService, Venue) {
        let service = BookingService::new(Arc::new(MemoryStore::new()));
        let venue = service
            .create_venue(
                OWNER,
                NewVenue {
                    name: "Harbour Hall".to_string(),
                    capacity: 200,
                    unit_price_cents: 50_000,
                    policy,
                },
                now(),
            )
            .await
            .unwrap();
        (service, venue)
    }

    fn request(venue: &Venue, dates: Vec<BookingDate>) -> NewBookingRequest {
        NewBookingRequest {
            venue_id: venue.id.clone(),
            event_id: Some("event-9".to_string()),
            dates,
        }
    }

    fn pay(reference: &str, amount_cents: i64) -> PaymentRequest {
        PaymentRequest { reference: reference.to_string(), amount_cents }
    }

    async fn confirmed_booking(
        service: &BookingService,
        venue: &Venue,
        customer: &str,
        dates: Vec<BookingDate>,
    ) -> VenueBooking {
        let booking = service.request_booking(customer, request(venue, dates), now()).await.unwrap();
        service.approve(&booking.id, OWNER, now()).await.unwrap();
        service
            .record_payment(&booking.id, customer, pay("dep", booking.deposit_cents), now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn request_approve_and_deposit_confirms_the_booking() {
        let (service, venue) = setup(BookingPolicy::default()).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_cents, 50_000);
        assert_eq!(booking.deposit_cents, 15_000);
        assert!(booking.deposit_due_at.is_none());

        let approved = service.approve(&booking.id, OWNER, now()).await.unwrap();
        assert_eq!(approved.status, BookingStatus::Approved);
        assert_eq!(approved.deposit_due_at, Some(now() + Duration::hours(48)));

        let confirmed = service
            .record_payment(&booking.id, ALICE, pay("pi_1", 15_000), now())
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::DepositPaid);
        assert_eq!(confirmed.history.len(), 3);

        let calendar = service.availability(&venue.id, june(19), june(21)).await.unwrap();
        assert_eq!(calendar[1].state, Availability::Booked);
        assert_eq!(calendar[0].state, Availability::Available);
    }

    #[tokio::test]
    async fn confirmation_supersedes_competing_requests() {
        let (service, venue) = setup(BookingPolicy::default()).await;
        let loser = service
            .request_booking(BOB, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        let elsewhere = service
            .request_booking(BOB, request(&venue, vec![BookingDate::whole_day(june(22))]), now())
            .await
            .unwrap();

        confirmed_booking(&service, &venue, ALICE, vec![BookingDate::whole_day(june(20))]).await;

        let loser = service.get_booking(&loser.id, BOB).await.unwrap();
        assert_eq!(loser.status, BookingStatus::Cancelled);
        assert_eq!(loser.cancellation, Some(CancellationReason::Superseded));
        let elsewhere = service.get_booking(&elsewhere.id, BOB).await.unwrap();
        assert_eq!(elsewhere.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn requests_for_held_hours_are_refused() {
        let policy = BookingPolicy {
            mode: BookingMode::Hourly,
            open_hour: 8,
            close_hour: 23,
            transition_hours: 2,
            ..BookingPolicy::default()
        };
        let (service, venue) = setup(policy).await;
        confirmed_booking(&service, &venue, ALICE, vec![BookingDate::hours(june(20), 10, 14)]).await;

        // Starts inside the turnover after Alice's event.
        let err = service
            .request_booking(BOB, request(&venue, vec![BookingDate::hours(june(20), 15, 17)]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict(_)));

        // Ends too close to Alice's start.
        let err = service
            .request_booking(BOB, request(&venue, vec![BookingDate::hours(june(20), 8, 9)]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict(_)));

        let ok = service
            .request_booking(BOB, request(&venue, vec![BookingDate::hours(june(20), 16, 18)]), now())
            .await
            .unwrap();
        assert_eq!(ok.total_cents, 100_000);
    }

    #[tokio::test]
    async fn competing_deposit_after_confirmation_is_a_conflict() {
        let policy = BookingPolicy { requires_approval: false, ..BookingPolicy::default() };
        let (service, venue) = setup(policy).await;
        let first = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        let second = service
            .request_booking(BOB, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        assert_eq!(first.status, BookingStatus::Approved);

        // Bob pays first and wins, Alice's request is cancelled as superseded.
        service.record_payment(&second.id, BOB, pay("bob-1", 15_000), now()).await.unwrap();
        let err = service
            .record_payment(&first.id, ALICE, pay("alice-1", 15_000), now())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Payment(_)));
        let first = service.get_booking(&first.id, ALICE).await.unwrap();
        assert_eq!(first.status, BookingStatus::Cancelled);
        assert!(first.payments.is_empty());
    }

    #[tokio::test]
    async fn payment_replays_are_idempotent() {
        let (service, venue) = setup(BookingPolicy::default()).await;
        let booking =
            confirmed_booking(&service, &venue, ALICE, vec![BookingDate::whole_day(june(20))]).await;

        let again = service
            .record_payment(&booking.id, ALICE, pay("dep", booking.deposit_cents), now())
            .await
            .unwrap();
        assert_eq!(again.version, booking.version);
        assert_eq!(again.payments.len(), 1);

        let balance = service
            .record_payment(&booking.id, ALICE, pay("bal", 35_000), now())
            .await
            .unwrap();
        assert_eq!(balance.payment_status, PaymentStatus::FullyPaid);
        assert_eq!(balance.payments[1].kind, PaymentKind::Balance);
    }

    #[tokio::test]
    async fn only_the_customer_pays_and_only_the_owner_approves() {
        let (service, venue) = setup(BookingPolicy::default()).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();

        assert!(matches!(
            service.approve(&booking.id, ALICE, now()).await,
            Err(BookingError::Forbidden(_))
        ));
        service.approve(&booking.id, OWNER, now()).await.unwrap();
        assert!(matches!(
            service.record_payment(&booking.id, BOB, pay("x", 15_000), now()).await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(matches!(
            service.get_booking(&booking.id, BOB).await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(service.get_booking(&booking.id, OWNER).await.is_ok());
    }

    #[tokio::test]
    async fn early_customer_cancellation_refunds_and_frees_the_date() {
        let (service, venue) = setup(BookingPolicy::default()).await;
        let booking =
            confirmed_booking(&service, &venue, ALICE, vec![BookingDate::whole_day(june(25))]).await;

        let cancelled = service
            .cancel(&booking.id, ALICE, Some("event moved".to_string()), now())
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancellation, Some(CancellationReason::RequestedByCustomer));
        assert_eq!(cancelled.refunded_cents, 15_000);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

        let calendar = service.availability(&venue.id, june(25), june(25)).await.unwrap();
        assert_eq!(calendar[0].state, Availability::Available);
        assert!(matches!(
            service.cancel(&booking.id, ALICE, None, now()).await,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn rejected_requests_cannot_be_approved() {
        let (service, venue) = setup(BookingPolicy::default()).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        let rejected = service
            .reject(&booking.id, OWNER, Some("private event that day".into()), now())
            .await
            .unwrap();
        assert_eq!(rejected.status, BookingStatus::Rejected);
        assert!(service.approve(&booking.id, OWNER, now()).await.is_err());
    }

    #[tokio::test]
    async fn free_bookings_confirm_immediately_when_no_approval_is_needed() {
        let policy = BookingPolicy {
            requires_approval: false,
            deposit_percent: 0,
            ..BookingPolicy::default()
        };
        let (service, venue) = setup(policy).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);

        let err = service
            .request_booking(BOB, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict(_)));
    }

    #[tokio::test]
    async fn sweeps_expire_cancel_and_complete() {
        let (service, venue) = setup(BookingPolicy::default()).await;

        // Approved but never paid.
        let unpaid = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        service.approve(&unpaid.id, OWNER, now()).await.unwrap();

        // Deposit only; balance due 7 days before June 12.
        let deposit_only =
            confirmed_booking(&service, &venue, BOB, vec![BookingDate::whole_day(june(12))]).await;

        // Short notice, so the balance is already due and only full payment
        // confirms it. Over by June 4.
        let paid = service
            .request_booking("carol", request(&venue, vec![BookingDate::whole_day(june(3))]), now())
            .await
            .unwrap();
        service.approve(&paid.id, OWNER, now()).await.unwrap();
        assert!(service
            .record_payment(&paid.id, "carol", pay("dep", paid.deposit_cents), now())
            .await
            .is_err());
        let paid = service
            .record_payment(&paid.id, "carol", pay("full", paid.total_cents), now())
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::FullyPaid);

        let later = Utc.with_ymd_and_hms(2030, 6, 5, 12, 0, 0).unwrap();
        let report = service.run_sweeps(later).await.unwrap();
        assert_eq!(
            report,
            SweepReport { expired: 1, cancelled_overdue: 1, completed: 1, failed: 0 }
        );

        let unpaid = service.get_booking(&unpaid.id, ALICE).await.unwrap();
        assert_eq!(unpaid.status, BookingStatus::Expired);

        let overdue = service.get_booking(&deposit_only.id, BOB).await.unwrap();
        assert_eq!(overdue.status, BookingStatus::Cancelled);
        assert_eq!(overdue.cancellation, Some(CancellationReason::BalanceOverdue));
        assert_eq!(overdue.refunded_cents, 0);
        assert_eq!(overdue.payment_status, PaymentStatus::DepositPaid);

        let paid = service.get_booking(&paid.id, "carol").await.unwrap();
        assert_eq!(paid.status, BookingStatus::Completed);

        // A second pass has nothing left to do.
        assert_eq!(service.run_sweeps(later).await.unwrap().touched(), 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (service, _) = setup(BookingPolicy::default()).await;
        assert!(matches!(service.get_venue("nope").await, Err(BookingError::NotFound { .. })));
        assert!(matches!(
            service.cancel("nope", ALICE, None, now()).await,
            Err(BookingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn free_booking_past_the_balance_deadline_waits_for_full_payment() {
        let policy = BookingPolicy {
            requires_approval: false,
            deposit_percent: 0,
            ..BookingPolicy::default()
        };
        let (service, venue) = setup(policy).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(4))]), now())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Approved);
        assert!(booking.balance_due_at <= now());

        let confirmed = service
            .record_payment(&booking.id, ALICE, pay("full", booking.total_cents), now())
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::FullyPaid);

        let report = service.run_sweeps(now() + Duration::minutes(1)).await.unwrap();
        assert_eq!(report.touched(), 0);
    }

    #[tokio::test]
    async fn approving_a_free_booking_past_the_balance_deadline_does_not_confirm() {
        let policy = BookingPolicy { deposit_percent: 0, ..BookingPolicy::default() };
        let (service, venue) = setup(policy).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(4))]), now())
            .await
            .unwrap();

        let approved = service.approve(&booking.id, OWNER, now()).await.unwrap();
        assert_eq!(approved.status, BookingStatus::Approved);
        let held = service.availability(&venue.id, june(4), june(4)).await.unwrap();
        assert_eq!(held[0].state, Availability::Available);
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum RacePoint {
        Claim,
        Update,
    }

    enum Interference {
        /// The same customer's other request lands first.
        Pay { customer: &'static str, payment: PaymentRequest },
        /// Some unrelated write bumps the stored version.
        Touch,
    }

    /// Lets another writer in right before the service's next claim or
    /// update of a booking.
    struct RacingStore {
        inner: Arc<MemoryStore>,
        pending: tokio::sync::Mutex<Option<(RacePoint, Interference)>>,
    }

    impl RacingStore {
        fn new() -> Self {
            RacingStore {
                inner: Arc::new(MemoryStore::new()),
                pending: tokio::sync::Mutex::new(None),
            }
        }

        async fn arm(&self, point: RacePoint, interference: Interference) {
            *self.pending.lock().await = Some((point, interference));
        }

        async fn interfere(&self, point: RacePoint, booking_id: &str) -> Result<()> {
            let interference = {
                let mut pending = self.pending.lock().await;
                match pending.as_ref() {
                    Some((armed, _)) if *armed == point => pending.take().map(|(_, i)| i),
                    _ => None,
                }
            };
            match interference {
                Some(Interference::Pay { customer, payment }) => {
                    BookingService::new(self.inner.clone())
                        .record_payment(booking_id, customer, payment, now())
                        .await?;
                }
                Some(Interference::Touch) => {
                    let mut stored = self
                        .inner
                        .find_booking(booking_id)
                        .await?
                        .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
                    self.inner.update_booking(&mut stored).await?;
                }
                None => {}
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl BookingStore for RacingStore {
        async fn insert_venue(&self, venue: &Venue) -> Result<()> {
            self.inner.insert_venue(venue).await
        }

        async fn find_venue(&self, venue_id: &str) -> Result<Option<Venue>> {
            self.inner.find_venue(venue_id).await
        }

        async fn list_venues(&self) -> Result<Vec<Venue>> {
            self.inner.list_venues().await
        }

        async fn insert_booking(&self, booking: &VenueBooking) -> Result<()> {
            self.inner.insert_booking(booking).await
        }

        async fn find_booking(&self, booking_id: &str) -> Result<Option<VenueBooking>> {
            self.inner.find_booking(booking_id).await
        }

        async fn update_booking(&self, booking: &mut VenueBooking) -> Result<()> {
            self.interfere(RacePoint::Update, &booking.id).await?;
            self.inner.update_booking(booking).await
        }

        async fn bookings_for_venue(
            &self,
            venue_id: &str,
            statuses: &[BookingStatus],
        ) -> Result<Vec<VenueBooking>> {
            self.inner.bookings_for_venue(venue_id, statuses).await
        }

        async fn bookings_for_customer(&self, customer_id: &str) -> Result<Vec<VenueBooking>> {
            self.inner.bookings_for_customer(customer_id).await
        }

        async fn bookings_with_status(&self, statuses: &[BookingStatus]) -> Result<Vec<VenueBooking>> {
            self.inner.bookings_with_status(statuses).await
        }

        async fn claim_slots(&self, slots: &[crate::models::slot::AvailabilitySlot]) -> Result<()> {
            if let Some(first) = slots.first() {
                self.interfere(RacePoint::Claim, &first.booking_id).await?;
            }
            self.inner.claim_slots(slots).await
        }

        async fn release_slots(&self, booking_id: &str) -> Result<u64> {
            self.inner.release_slots(booking_id).await
        }

        async fn slots_between(
            &self,
            venue_id: &str,
            from: chrono::NaiveDateTime,
            to: chrono::NaiveDateTime,
        ) -> Result<Vec<crate::models::slot::AvailabilitySlot>> {
            self.inner.slots_between(venue_id, from, to).await
        }
    }

    async fn racing_setup() -> (Arc<RacingStore>, BookingService, Venue, VenueBooking) {
        let store = Arc::new(RacingStore::new());
        let service = BookingService::new(store.clone());
        let venue = service
            .create_venue(
                OWNER,
                NewVenue {
                    name: "Granary".to_string(),
                    capacity: 90,
                    unit_price_cents: 50_000,
                    policy: BookingPolicy::default(),
                },
                now(),
            )
            .await
            .unwrap();
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        let booking = service.approve(&booking.id, OWNER, now()).await.unwrap();
        (store, service, venue, booking)
    }

    async fn held_hours(store: &RacingStore, venue: &Venue) -> Vec<crate::models::slot::AvailabilitySlot> {
        let from = june(1).and_hms_opt(0, 0, 0).unwrap();
        let to = june(30).and_hms_opt(0, 0, 0).unwrap();
        store.inner.slots_between(&venue.id, from, to).await.unwrap()
    }

    #[tokio::test]
    async fn deposit_replay_losing_the_claim_returns_the_stored_booking() {
        let (store, service, venue, booking) = racing_setup().await;
        store
            .arm(RacePoint::Claim, Interference::Pay { customer: ALICE, payment: pay("pi_1", 15_000) })
            .await;

        let result = service
            .record_payment(&booking.id, ALICE, pay("pi_1", 15_000), now())
            .await
            .unwrap();
        assert_eq!(result.status, BookingStatus::Confirmed);
        assert_eq!(result.payments.len(), 1);
        assert_eq!(result.paid_cents, 15_000);

        let held = held_hours(&store, &venue).await;
        assert_eq!(held.len(), 24);
        assert!(held.iter().all(|s| s.booking_id == booking.id));
    }

    #[tokio::test]
    async fn balance_replay_losing_the_write_returns_the_stored_booking() {
        let (store, service, _venue, booking) = racing_setup().await;
        service
            .record_payment(&booking.id, ALICE, pay("pi_1", 15_000), now())
            .await
            .unwrap();
        store
            .arm(RacePoint::Update, Interference::Pay { customer: ALICE, payment: pay("bal_1", 35_000) })
            .await;

        let result = service
            .record_payment(&booking.id, ALICE, pay("bal_1", 35_000), now())
            .await
            .unwrap();
        assert_eq!(result.payment_status, PaymentStatus::FullyPaid);
        assert_eq!(result.paid_cents, 50_000);
        assert_eq!(result.payments.iter().filter(|p| p.reference == "bal_1").count(), 1);
    }

    #[tokio::test]
    async fn stale_write_after_claiming_gives_the_hours_back() {
        let (store, service, venue, booking) = racing_setup().await;
        store.arm(RacePoint::Update, Interference::Touch).await;

        let err = service
            .record_payment(&booking.id, ALICE, pay("pi_1", 15_000), now())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StaleWrite(_)));
        assert!(held_hours(&store, &venue).await.is_empty());

        let stored = service.get_booking(&booking.id, ALICE).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Approved);
        assert!(stored.payments.is_empty());

        // Nothing was applied, so the customer can simply retry.
        let retried = service
            .record_payment(&booking.id, ALICE, pay("pi_1", 15_000), now())
            .await
            .unwrap();
        assert_eq!(retried.status, BookingStatus::Confirmed);
        assert_eq!(held_hours(&store, &venue).await.len(), 24);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancellation_logs_both_ends_of_the_transition() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (service, venue) = setup(BookingPolicy::default()).await;
        let booking = service
            .request_booking(ALICE, request(&venue, vec![BookingDate::whole_day(june(20))]), now())
            .await
            .unwrap();
        service.cancel(&booking.id, ALICE, None, now()).await.unwrap();

        let text = logs.text();
        let line = text.lines().find(|l| l.contains("booking cancelled")).unwrap();
        assert!(line.contains("from=pending"), "{}", line);
        assert!(line.contains("to=cancelled"), "{}", line);
    }
}

