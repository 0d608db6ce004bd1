//! Pricing, deposits and payment application.
//!
//! Payments are keyed by the caller's `reference`. Applying the same reference
//! twice is a no-op, so payment-provider retries and double submits never
//! move money twice.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::booking::schedule::SlotPlan;
use crate::error::BookingError;
use crate::models::booking::{
    BookingStatus, CancellationReason, PaymentKind, PaymentRecord, PaymentRequest, PaymentStatus,
    VenueBooking,
};
use crate::models::venue::{BookingMode, BookingPolicy, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub total_cents: i64,
    pub deposit_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Reference already applied with the same amount.
    Replayed,
    /// First payment on an approved booking; the booking must now be confirmed.
    DepositSettled,
    /// Balance payment on a confirmed booking.
    Applied,
}

/// Deposit rounded up to the next cent. `None` on overflow.
pub fn deposit_amount(total_cents: i64, deposit_percent: u32) -> Option<i64> {
    total_cents
        .checked_mul(i64::from(deposit_percent))?
        .checked_add(99)
        .map(|cents| cents / 100)
}

pub fn quote(venue: &Venue, plan: &SlotPlan) -> Result<Quote, BookingError> {
    let units = match venue.policy.mode {
        BookingMode::Daily => plan.segments.len() as i64,
        BookingMode::Hourly => plan.core_hours(),
    };
    let too_large = || BookingError::Validation("booking total is too large".to_string());
    let total_cents = units.checked_mul(venue.unit_price_cents).ok_or_else(too_large)?;
    let deposit_cents =
        deposit_amount(total_cents, venue.policy.deposit_percent).ok_or_else(too_large)?;
    Ok(Quote { total_cents, deposit_cents })
}

pub fn balance_due_at(starts_at: NaiveDateTime, policy: &BookingPolicy) -> DateTime<Utc> {
    (starts_at - Duration::days(i64::from(policy.balance_due_days))).and_utc()
}

pub fn apply_payment(
    booking: &mut VenueBooking,
    request: &PaymentRequest,
    now: DateTime<Utc>,
) -> Result<PaymentOutcome, BookingError> {
    let reference = request.reference.trim();
    if reference.is_empty() {
        return Err(BookingError::Validation("payment reference is required".to_string()));
    }
    if request.amount_cents <= 0 {
        return Err(BookingError::Payment("amount must be positive".to_string()));
    }

    if let Some(existing) = booking.payments.iter().find(|p| p.reference == reference) {
        if existing.amount_cents == request.amount_cents {
            return Ok(PaymentOutcome::Replayed);
        }
        return Err(BookingError::Payment(format!(
            "reference {} was already used for {} cents",
            reference, existing.amount_cents
        )));
    }

    match booking.status {
        BookingStatus::Approved => {
            // Once the balance deadline has passed there is no deposit stage.
            let required = if now >= booking.balance_due_at {
                booking.total_cents
            } else {
                booking.deposit_cents
            };
            if request.amount_cents < required {
                return Err(BookingError::Payment(format!(
                    "at least {} cents are required to confirm this booking",
                    required
                )));
            }
            if request.amount_cents > booking.total_cents {
                return Err(BookingError::Payment(format!(
                    "amount exceeds the booking total of {} cents",
                    booking.total_cents
                )));
            }

            let settled = request.amount_cents == booking.total_cents;
            booking.payments.push(PaymentRecord {
                reference: reference.to_string(),
                kind: if settled { PaymentKind::Full } else { PaymentKind::Deposit },
                amount_cents: request.amount_cents,
                received_at: now,
            });
            booking.paid_cents = request.amount_cents;
            booking.payment_status =
                if settled { PaymentStatus::FullyPaid } else { PaymentStatus::DepositPaid };
            booking.updated_at = now;
            Ok(PaymentOutcome::DepositSettled)
        }
        BookingStatus::Confirmed => {
            let outstanding = booking.outstanding_cents();
            if outstanding == 0 {
                return Err(BookingError::Payment("booking is already fully paid".to_string()));
            }
            if request.amount_cents > outstanding {
                return Err(BookingError::Payment(format!(
                    "amount exceeds the outstanding balance of {} cents",
                    outstanding
                )));
            }

            booking.payments.push(PaymentRecord {
                reference: reference.to_string(),
                kind: PaymentKind::Balance,
                amount_cents: request.amount_cents,
                received_at: now,
            });
            booking.paid_cents += request.amount_cents;
            if booking.paid_cents == booking.total_cents {
                booking.payment_status = PaymentStatus::FullyPaid;
            }
            booking.updated_at = now;
            Ok(PaymentOutcome::Applied)
        }
        other => Err(BookingError::Payment(format!(
            "payments are not accepted while the booking is {}",
            other
        ))),
    }
}

pub fn refund_due(
    booking: &VenueBooking,
    policy: &BookingPolicy,
    reason: CancellationReason,
    now: DateTime<Utc>,
) -> i64 {
    let paid = booking.paid_cents;
    let keep_deposit = paid - booking.deposit_cents.min(paid);
    match reason {
        CancellationReason::RequestedByOwner | CancellationReason::Superseded => paid,
        CancellationReason::RequestedByCustomer => {
            let cutoff = booking.starts_at.and_utc()
                - Duration::days(i64::from(policy.refund_cutoff_days));
            if now <= cutoff {
                paid
            } else {
                keep_deposit
            }
        }
        CancellationReason::BalanceOverdue => keep_deposit,
    }
}

pub fn record_refund(booking: &mut VenueBooking, amount_cents: i64, now: DateTime<Utc>) {
    if amount_cents <= 0 {
        return;
    }
    booking.payments.push(PaymentRecord {
        reference: format!("refund-{}", booking.reference),
        kind: PaymentKind::Refund,
        amount_cents,
        received_at: now,
    });
    booking.refunded_cents += amount_cents;
    booking.payment_status = PaymentStatus::Refunded;
    booking.updated_at = now;
}
