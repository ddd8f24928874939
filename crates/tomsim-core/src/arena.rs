//! Arena geometry: movement, placement, and encounter classification.
//!
//! The arena is a square of side `size`. Agents walk one unit per tick
//! along their heading and must stay within `[1, size - 1]` on both axes.
//! Two agents meet when they come closer than `meeting_radius`.

use rand::Rng;
use tomsim_agents::Agent;
use tomsim_types::{AgentId, Position};

use crate::config::ArenaConfig;

/// Headings are drawn as whole degrees in `[0, FULL_TURN)`.
const FULL_TURN: u16 = 360;

/// Heading draws attempted before an agent gives up moving this tick.
const MAX_HEADING_DRAWS: usize = 720;

/// Placement draws attempted before accepting a crowded spot.
const MAX_PLACEMENT_DRAWS: usize = 10_000;

/// What lies at the target of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encounter {
    /// Nobody within reach; take the step.
    Clear,
    /// A suitable partner is within reach; open a negotiation.
    Partner(AgentId),
    /// Someone unsuitable is within reach; turn without moving.
    Blocked(AgentId),
}

/// Square arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    cells: u32,
    size: f64,
    meeting_radius: f64,
}

impl Arena {
    /// Build an arena from configuration.
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            cells: config.size.max(1),
            size: f64::from(config.size),
            meeting_radius: config.meeting_radius,
        }
    }

    /// Side length.
    pub const fn size(&self) -> f64 {
        self.size
    }

    /// Where one step along `heading` (degrees) leads.
    pub fn step(position: Position, heading: f64) -> Position {
        let radians = heading.to_radians();
        Position::new(position.x + radians.cos(), position.y + radians.sin())
    }

    /// Whether `position` keeps a unit margin from every wall.
    pub fn is_legal(&self, position: &Position) -> bool {
        let upper = self.size - 1.0;
        (1.0..=upper).contains(&position.x) && (1.0..=upper).contains(&position.y)
    }

    /// A uniformly random whole-degree heading.
    pub fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> f64 {
        f64::from(rng.random_range(0..FULL_TURN))
    }

    /// A random integer point in `[0, size)` on both axes.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        Position::new(
            f64::from(rng.random_range(0..self.cells)),
            f64::from(rng.random_range(0..self.cells)),
        )
    }

    /// Heading and target of the next step. Keeps `heading` when its step is
    /// legal, otherwise redraws headings until one is. `None` if no legal
    /// heading turned up.
    pub fn choose_step<R: Rng + ?Sized>(
        &self,
        position: Position,
        heading: f64,
        rng: &mut R,
    ) -> Option<(f64, Position)> {
        let target = Self::step(position, heading);
        if self.is_legal(&target) {
            return Some((heading, target));
        }
        (0..MAX_HEADING_DRAWS).find_map(|_| {
            let heading = Self::random_heading(rng);
            let target = Self::step(position, heading);
            self.is_legal(&target).then_some((heading, target))
        })
    }

    /// Whether `a` and `b` are close enough to meet.
    pub fn within_reach(&self, a: &Position, b: &Position) -> bool {
        a.distance(b) < self.meeting_radius
    }

    /// A random spot with no agent in `occupied` within the meeting radius
    /// (inclusive). Falls back to the last draw if the arena is too crowded.
    pub fn place<'a, R, I>(&self, occupied: I, rng: &mut R) -> Position
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = &'a Position> + Clone,
    {
        let mut spot = self.random_point(rng);
        for _ in 0..MAX_PLACEMENT_DRAWS {
            let crowded = occupied
                .clone()
                .into_iter()
                .any(|other| other.distance(&spot) <= self.meeting_radius);
            if !crowded {
                return spot;
            }
            spot = self.random_point(rng);
        }
        tracing::warn!(x = spot.x, y = spot.y, "arena crowded; placing agent without clearance");
        spot
    }

    /// Classify the target of `mover`'s step against `others`, scanned in
    /// population order. The first agent within reach decides.
    ///
    /// An agent is unsuitable if it is negotiating, if either party was the
    /// other's last partner, or if it is among the mover's `avoid_recent`
    /// latest unsuccessful partners.
    pub fn classify<'a, I>(
        &self,
        mover: &Agent,
        target: &Position,
        others: I,
        avoid_recent: Option<usize>,
    ) -> Encounter
    where
        I: IntoIterator<Item = &'a Agent>,
    {
        let Some(other) = others
            .into_iter()
            .filter(|other| other.id() != mover.id())
            .find(|other| self.within_reach(&other.position(), target))
        else {
            return Encounter::Clear;
        };

        let unsuitable = other.is_negotiating()
            || mover.previous_partner() == Some(other.id())
            || other.previous_partner() == Some(mover.id())
            || avoid_recent.is_some_and(|window| mover.recently_failed_with(other.id(), window));
        if unsuitable {
            Encounter::Blocked(other.id())
        } else {
            Encounter::Partner(other.id())
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tomsim_agents::AgentSpawn;
    use tomsim_types::{ExperimentVariant, NegotiationEnding, NegotiationId, ToMOrder};

    use super::*;

    fn arena() -> Arena {
        Arena::new(&ArenaConfig::default())
    }

    fn agent(id: u64, x: f64, y: f64) -> Agent {
        Agent::new(AgentSpawn {
            id: AgentId(id),
            order: ToMOrder::Zero,
            producing: 0,
            position: Position::new(x, y),
            heading: 0.0,
            age: 0,
        })
    }

    #[test]
    fn step_follows_heading() {
        let next = Arena::step(Position::new(10.0, 10.0), 90.0);
        assert!((next.x - 10.0).abs() < 1e-9);
        assert!((next.y - 11.0).abs() < 1e-9);
    }

    #[test]
    fn legality_keeps_a_unit_margin() {
        let arena = arena();
        assert!(arena.is_legal(&Position::new(1.0, 599.0)));
        assert!(!arena.is_legal(&Position::new(0.5, 300.0)));
        assert!(!arena.is_legal(&Position::new(300.0, 599.5)));
    }

    #[test]
    fn wall_forces_a_new_heading() {
        let arena = arena();
        let mut rng = StdRng::seed_from_u64(8);
        let at_wall = Position::new(1.2, 300.0);
        let Some((heading, target)) = arena.choose_step(at_wall, 180.0, &mut rng) else {
            panic!("a legal heading exists");
        };
        assert!(arena.is_legal(&target));
        assert!((heading - 180.0).abs() > f64::EPSILON);
    }

    #[test]
    fn legal_heading_is_kept() {
        let arena = arena();
        let mut rng = StdRng::seed_from_u64(8);
        let step = arena.choose_step(Position::new(300.0, 300.0), 45.0, &mut rng);
        assert!(step.is_some_and(|(heading, _)| (heading - 45.0).abs() < f64::EPSILON));
    }

    #[test]
    fn placement_avoids_occupied_spots() {
        let arena = arena();
        let mut rng = StdRng::seed_from_u64(2);
        let occupied: Vec<Position> = (0..50)
            .map(|i| Position::new(f64::from(i) * 12.0, 300.0))
            .collect();
        for _ in 0..20 {
            let spot = arena.place(&occupied, &mut rng);
            assert!(occupied.iter().all(|other| other.distance(&spot) > 10.0));
            assert!(spot.x >= 0.0 && spot.x < 600.0);
        }
    }

    #[test]
    fn nearby_free_agent_is_a_partner() {
        let arena = arena();
        let mover = agent(1, 100.0, 100.0);
        let near = agent(2, 105.0, 100.0);
        let far = agent(3, 300.0, 300.0);
        let target = Position::new(101.0, 100.0);
        let result = arena.classify(&mover, &target, [&mover, &far, &near], None);
        assert_eq!(result, Encounter::Partner(AgentId(2)));
    }

    #[test]
    fn empty_surroundings_are_clear() {
        let arena = arena();
        let mover = agent(1, 100.0, 100.0);
        let far = agent(3, 300.0, 300.0);
        let result = arena.classify(&mover, &Position::new(101.0, 100.0), [&mover, &far], None);
        assert_eq!(result, Encounter::Clear);
    }

    #[test]
    fn negotiating_or_previous_partner_blocks() {
        let arena = arena();
        let target = Position::new(101.0, 100.0);

        let mover = agent(1, 100.0, 100.0);
        let mut busy = agent(2, 104.0, 100.0);
        busy.join_negotiation(NegotiationId(1), AgentId(9), false);
        assert_eq!(arena.classify(&mover, &target, [&busy], None), Encounter::Blocked(AgentId(2)));

        let mut mover = agent(1, 100.0, 100.0);
        let old_friend = agent(2, 104.0, 100.0);
        mover.prepare_for(AgentId(2));
        assert_eq!(
            arena.classify(&mover, &target, [&old_friend], None),
            Encounter::Blocked(AgentId(2))
        );
    }

    #[test]
    fn recent_failures_block_only_when_avoided() {
        let arena = arena();
        let target = Position::new(101.0, 100.0);
        let mut mover = agent(1, 100.0, 100.0);
        mover.conclude_negotiation(AgentId(2), NegotiationEnding::TooLong, ExperimentVariant::UseExperience);
        let other = agent(2, 104.0, 100.0);

        assert_eq!(arena.classify(&mover, &target, [&other], Some(5)), Encounter::Blocked(AgentId(2)));
        assert_eq!(arena.classify(&mover, &target, [&other], None), Encounter::Partner(AgentId(2)));
    }
}
