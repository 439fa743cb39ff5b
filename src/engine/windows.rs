use crate::model::*;

// ── Free-window algebra ──────────────────────────────────────────

/// Compute the free gaps on a venue within `query`: the query window minus
/// every non-cancelled reservation span, clamped to the window.
pub fn free_windows(vs: &VenueState, query: &Span) -> Vec<Span> {
    let mut occupied: Vec<Span> = vs
        .overlapping(query)
        .filter(|r| r.status.occupies())
        .map(|r| {
            Span::new(
                r.span.start.max(query.start),
                r.span.end.min(query.end),
            )
        })
        .collect();
    occupied.sort_by_key(|s| s.start);
    let occupied = merge_overlapping(&occupied);
    subtract_intervals(&[*query], &occupied)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ulid::Ulid;

    use super::*;

    fn venue_with(reservations: Vec<(Ms, Ms, ReservationStatus)>) -> VenueState {
        let mut vs = VenueState::new("Main Hall".into());
        for (start, end, status) in reservations {
            vs.insert_reservation(Reservation {
                id: Ulid::new(),
                span: Span::new(start, end),
                owner: "registrar".into(),
                status,
                metadata: HashMap::new(),
            });
        }
        vs
    }

    // ── subtract_intervals ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        let result = subtract_intervals(&base, &remove);
        assert!(result.is_empty());
    }

    #[test]
    fn subtract_partial_left() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 150)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, vec![Span::new(150, 200)]);
    }

    #[test]
    fn subtract_partial_right() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(150, 250)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, vec![Span::new(100, 150)]);
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(result, vec![Span::new(100, 150), Span::new(200, 300)]);
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![Span::new(0, 1000)];
        let remove = vec![
            Span::new(100, 200),
            Span::new(400, 500),
            Span::new(800, 900),
        ];
        let result = subtract_intervals(&base, &remove);
        assert_eq!(
            result,
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }

    #[test]
    fn subtract_empty_base() {
        assert!(subtract_intervals(&[], &[Span::new(0, 100)]).is_empty());
    }

    #[test]
    fn subtract_empty_removals() {
        let base = vec![Span::new(0, 100)];
        assert_eq!(subtract_intervals(&base, &[]), base);
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![
            Span::new(100, 300),
            Span::new(200, 400),
            Span::new(500, 600),
        ];
        let merged = merge_overlapping(&spans);
        assert_eq!(merged, vec![Span::new(100, 400), Span::new(500, 600)]);
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300)];
        let merged = merge_overlapping(&spans);
        assert_eq!(merged, vec![Span::new(100, 300)]);
    }

    #[test]
    fn merge_empty() {
        assert!(merge_overlapping(&[]).is_empty());
    }

    #[test]
    fn merge_single() {
        let spans = vec![Span::new(0, 100)];
        assert_eq!(merge_overlapping(&spans), spans);
    }

    // ── free_windows ─────────────────────────────────────

    #[test]
    fn free_windows_empty_venue_is_whole_window() {
        let vs = venue_with(vec![]);
        let free = free_windows(&vs, &Span::new(0, 1000));
        assert_eq!(free, vec![Span::new(0, 1000)]);
    }

    #[test]
    fn free_windows_fragments_around_reservations() {
        let vs = venue_with(vec![
            (100, 200, ReservationStatus::Scheduled),
            (400, 500, ReservationStatus::Ongoing),
        ]);
        let free = free_windows(&vs, &Span::new(0, 1000));
        assert_eq!(
            free,
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 1000),
            ]
        );
    }

    #[test]
    fn free_windows_skips_cancelled() {
        let vs = venue_with(vec![(100, 200, ReservationStatus::Cancelled)]);
        let free = free_windows(&vs, &Span::new(0, 1000));
        assert_eq!(free, vec![Span::new(0, 1000)]);
    }

    #[test]
    fn free_windows_clamps_to_query() {
        // Reservation spilling over both window edges
        let vs = venue_with(vec![(0, 10_000, ReservationStatus::Scheduled)]);
        let free = free_windows(&vs, &Span::new(500, 600));
        assert!(free.is_empty());
    }

    #[test]
    fn free_windows_fully_booked() {
        let vs = venue_with(vec![
            (0, 500, ReservationStatus::Scheduled),
            (500, 1000, ReservationStatus::Scheduled),
        ]);
        let free = free_windows(&vs, &Span::new(0, 1000));
        assert!(free.is_empty());
    }
}
