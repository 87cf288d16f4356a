//! Timeline scenarios against a real directory.

use chrono::{DateTime, Duration, TimeZone, Utc};
use peerdir_core::{
  Account,
  AccountId,
  ContactMethodId,
  Direction,
  Directory,
  EventCategory,
  NewEvent,
  NoNameService,
  Person,
  Protocol,
};

use crate::{
  GroupKind,
  Grouping,
  NodeKind,
  PeersTimeline,
  TimeCategory,
  Timeline,
  TimelineChange,
  TimelineSource,
};

const HOST: &str = "pbx.example.org";

fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

fn now() -> DateTime<Utc> { at(1_700_000_000) }

fn ago(minutes: i64) -> DateTime<Utc> { now() - Duration::minutes(minutes) }

fn sip0() -> AccountId { "sip0".into() }

fn directory() -> Directory {
  let mut dir = Directory::new(NoNameService).with_clock(now);
  dir
    .register_account(Account {
      id:        sip0(),
      protocol:  Protocol::Sip,
      hostname:  HOST.into(),
      user_name: String::new(),
      ip2ip:     false,
    })
    .unwrap();
  dir
}

fn peer(dir: &mut Directory, user: &str) -> ContactMethodId {
  dir
    .resolve(&format!("sip:{user}@{HOST}"), Some(&sip0()), None, None)
    .unwrap()
}

fn call(minutes_ago: i64) -> NewEvent {
  NewEvent::call(Direction::Outgoing, ago(minutes_ago), ago(minutes_ago) + Duration::minutes(2))
}

fn text(minutes_ago: i64, body: &str) -> NewEvent {
  NewEvent::message(Direction::Incoming, ago(minutes_ago), body)
}

fn timeline_of(dir: &Directory, cm: ContactMethodId) -> Timeline {
  let mut timeline =
    Timeline::new(TimelineSource::ContactMethod(cm), Grouping::default());
  timeline.init(dir, now());
  timeline
}

/// Feed every queued directory notification to the timeline.
fn pump(dir: &mut Directory, timeline: &mut Timeline) -> bool {
  let mut changed = false;
  for notification in dir.take_notifications() {
    changed |= timeline.apply(dir, &notification);
  }
  changed
}

/// Every sibling list is ordered by start time.
fn assert_ordered(timeline: &Timeline) {
  let mut lists = vec![timeline.roots().to_vec()];
  lists.extend(timeline.walk().into_iter().map(|id| timeline.children(id).to_vec()));
  for list in lists {
    let starts: Vec<_> = list
      .iter()
      .map(|id| timeline.node(*id).unwrap().start)
      .collect();
    assert!(starts.windows(2).all(|w| w[0] <= w[1]), "{starts:?}");
  }
}

/// Category counters match the leaves actually below them.
fn assert_counted(timeline: &Timeline) {
  for root in timeline.roots() {
    let NodeKind::TimeCategory { entries, .. } = timeline.node(*root).unwrap().kind
    else {
      panic!("root is not a time category");
    };
    let leaves: usize = timeline
      .children(*root)
      .iter()
      .map(|g| timeline.children(*g).len())
      .sum();
    assert_eq!(entries, leaves);
  }
  assert_eq!(timeline.total_entries(), timeline.leaf_count());
}

// ─── Construction ────────────────────────────────────────────────────────────

#[test]
fn init_backfills_existing_events() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir.add_event(alice, call(600)).unwrap();
  dir.add_event(alice, text(30, "hi")).unwrap();

  let timeline = timeline_of(&dir, alice);

  assert!(timeline.is_initialized());
  assert_eq!(timeline.leaf_count(), 2);
  assert_eq!(timeline.roots().len(), 1);
  let today = timeline.category(TimeCategory::Today).unwrap();
  assert_eq!(timeline.roots(), &[today]);
  assert_counted(&timeline);
}

#[test]
fn out_of_order_events_are_sorted() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  for minutes in [30, 600, 5, 3000, 120, 45_000, 90] {
    dir.add_event(alice, text(minutes, "hey")).unwrap();
  }
  let mut timeline = timeline_of(&dir, alice);
  dir.take_notifications();

  for minutes in [10, 2000, 1] {
    dir.add_event(alice, call(minutes)).unwrap();
  }
  assert!(pump(&mut dir, &mut timeline));

  assert_eq!(timeline.leaf_count(), 10);
  assert_ordered(&timeline);
  assert_counted(&timeline);

  let categories: Vec<_> = timeline
    .roots()
    .iter()
    .filter_map(|r| timeline.node(*r).unwrap().time_category())
    .collect();
  let mut oldest_first = categories.clone();
  oldest_first.sort_by(|a, b| b.cmp(a));
  assert_eq!(categories, oldest_first);
}

#[test]
fn unshown_events_are_skipped() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir
    .add_event(
      alice,
      NewEvent::new(EventCategory::DataTransfer, Direction::Incoming, ago(10)),
    )
    .unwrap();
  dir.add_event(alice, text(5, "   ")).unwrap();
  dir.add_event(alice, text(1, "real")).unwrap();

  let timeline = timeline_of(&dir, alice);

  assert_eq!(timeline.leaf_count(), 1);
  assert_counted(&timeline);
}

#[test]
fn never_category_holds_unknown_times() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir
    .add_event(alice, NewEvent::call(Direction::Incoming, at(0), at(0)))
    .unwrap();

  let timeline = timeline_of(&dir, alice);

  assert!(timeline.category(TimeCategory::Never).is_some());
}

// ─── Grouping ────────────────────────────────────────────────────────────────

#[test]
fn messages_close_together_share_a_group() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir.add_event(alice, text(100, "one")).unwrap();
  dir.add_event(alice, text(95, "two")).unwrap();
  dir.add_event(alice, text(90, "three")).unwrap();
  // More than twenty minutes of silence.
  dir.add_event(alice, text(40, "later")).unwrap();

  let timeline = timeline_of(&dir, alice);

  let today = timeline.category(TimeCategory::Today).unwrap();
  let groups = timeline.children(today);
  assert_eq!(groups.len(), 2);
  assert_eq!(timeline.children(groups[0]).len(), 3);
  assert_eq!(timeline.children(groups[1]).len(), 1);

  let (kind, summary) = timeline.node(groups[0]).unwrap().group().unwrap();
  assert_eq!(kind, GroupKind::Texts);
  assert_eq!(summary.incoming, 3);
  assert_eq!(summary.unread, 3);
}

#[test]
fn different_kinds_never_share_a_group() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir.add_event(alice, text(20, "calling you")).unwrap();
  dir.add_event(alice, call(18)).unwrap();
  dir.add_event(alice, text(10, "thanks")).unwrap();

  let timeline = timeline_of(&dir, alice);

  let today = timeline.category(TimeCategory::Today).unwrap();
  let kinds: Vec<_> = timeline
    .children(today)
    .iter()
    .map(|g| timeline.node(*g).unwrap().group().unwrap().0)
    .collect();
  assert_eq!(kinds, vec![GroupKind::Texts, GroupKind::Calls, GroupKind::Texts]);
}

#[test]
fn group_head_opens_a_new_group() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir.add_event(alice, text(10, "one")).unwrap();
  dir.add_event(alice, text(9, "two").group_head()).unwrap();

  let timeline = timeline_of(&dir, alice);

  let today = timeline.category(TimeCategory::Today).unwrap();
  assert_eq!(timeline.children(today).len(), 2);
}

#[test]
fn missed_calls_are_tallied() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir
    .add_event(alice, NewEvent::call(Direction::Incoming, ago(30), ago(30)).missed())
    .unwrap();
  dir.add_event(alice, call(20)).unwrap();

  let timeline = timeline_of(&dir, alice);

  let today = timeline.category(TimeCategory::Today).unwrap();
  let group = timeline.children(today)[0];
  let (_, summary) = timeline.node(group).unwrap().group().unwrap();
  assert_eq!(summary.missed_incoming, 1);
  assert_eq!(summary.outgoing, 1);
  assert_eq!(summary.total(), 2);
  assert_eq!(summary.unread, 1);
}

// ─── Live updates ────────────────────────────────────────────────────────────

#[test]
fn live_events_append() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  let bob = peer(&mut dir, "bob");
  dir.add_event(alice, text(60, "first")).unwrap();
  let mut timeline = timeline_of(&dir, alice);
  timeline.take_changes();
  dir.take_notifications();

  let event = dir.add_event(alice, text(1, "newest")).unwrap();
  dir.add_event(bob, text(1, "not for alice")).unwrap();
  assert!(pump(&mut dir, &mut timeline));

  assert_eq!(timeline.leaf_count(), 2);
  let leaf = timeline.leaf_for(event).unwrap();
  let changes = timeline.take_changes();
  assert!(changes.iter().any(|c| matches!(
    c,
    TimelineChange::Inserted { node, row: 0, .. } if *node == leaf
  )));
  assert_counted(&timeline);
}

#[test]
fn reading_a_message_updates_the_group() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  let event = dir.add_event(alice, text(5, "unread")).unwrap();
  let mut timeline = timeline_of(&dir, alice);
  dir.take_notifications();

  dir.set_event_read(event, true).unwrap();
  assert!(pump(&mut dir, &mut timeline));

  let leaf = timeline.leaf_for(event).unwrap();
  let group = timeline.node(leaf).unwrap().parent.unwrap();
  assert_eq!(timeline.node(group).unwrap().group().unwrap().1.unread, 0);
}

#[test]
fn cleared_timeline_ignores_notifications() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  let mut timeline = timeline_of(&dir, alice);
  dir.take_notifications();

  timeline.clear();
  dir.add_event(alice, text(1, "hello")).unwrap();

  assert!(!pump(&mut dir, &mut timeline));
  assert_eq!(timeline.leaf_count(), 0);
  assert!(timeline.roots().is_empty());
}

#[test]
fn binding_a_person_reloads() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir.add_event(alice, call(30)).unwrap();
  let mut timeline = timeline_of(&dir, alice);
  dir.take_notifications();

  let uid = dir.add_person(Person::new("Alice"));
  dir.set_person(alice, Some(uid)).unwrap();
  assert!(pump(&mut dir, &mut timeline));

  assert_eq!(timeline.leaf_count(), 1);
  assert_eq!(timeline.take_changes().last(), Some(&TimelineChange::Reset));
}

// ─── Rebase ──────────────────────────────────────────────────────────────────

#[test]
fn merging_members_keeps_every_leaf_once() {
  let mut dir = directory();
  let work = peer(&mut dir, "alice");
  let home = peer(&mut dir, "alice.home");
  let individual = dir.individual_for_contact_methods(&[work, home]).unwrap();
  for minutes in [300, 200, 100] {
    dir.add_event(work, call(minutes)).unwrap();
  }
  dir.add_event(home, text(250, "on my way")).unwrap();
  dir.add_event(home, text(50, "here")).unwrap();

  let mut timeline =
    Timeline::new(TimelineSource::Individual(individual), Grouping::default());
  timeline.init(&dir, now());
  assert_eq!(timeline.leaf_count(), 5);
  dir.take_notifications();

  assert!(dir.merge(work, home));
  pump(&mut dir, &mut timeline);

  assert_eq!(timeline.leaf_count(), 5);
  assert_eq!(timeline.total_entries(), 5);
  assert_ordered(&timeline);
  assert_counted(&timeline);
}

#[test]
fn merging_an_outsider_brings_its_history() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  let stranger = peer(&mut dir, "alice.old");
  let individual = dir.individual_for_contact_method(alice).unwrap();
  dir.add_event(alice, call(100)).unwrap();
  dir.add_event(stranger, call(50)).unwrap();

  let mut timeline =
    Timeline::new(TimelineSource::Individual(individual), Grouping::default());
  timeline.init(&dir, now());
  assert_eq!(timeline.leaf_count(), 1);
  dir.take_notifications();

  assert!(dir.merge(alice, stranger));
  assert!(pump(&mut dir, &mut timeline));

  assert_eq!(timeline.leaf_count(), 2);
  assert_counted(&timeline);
}

// ─── Rebucketing ─────────────────────────────────────────────────────────────

#[test]
fn rebucket_moves_groups_and_keeps_subtrees() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  let first = dir.add_event(alice, text(60, "one")).unwrap();
  let second = dir.add_event(alice, text(55, "two")).unwrap();
  let mut timeline = timeline_of(&dir, alice);

  let leaf = timeline.leaf_for(first).unwrap();
  let group = timeline.node(leaf).unwrap().parent.unwrap();
  assert!(!timeline.rebucket(now()));

  assert!(timeline.rebucket(now() + Duration::days(1)));

  assert!(timeline.category(TimeCategory::Today).is_none());
  let yesterday = timeline.category(TimeCategory::Yesterday).unwrap();
  assert_eq!(timeline.children(yesterday), &[group]);
  assert_eq!(timeline.children(group), &[leaf, timeline.leaf_for(second).unwrap()]);
  assert_eq!(timeline.node(group).unwrap().parent, Some(yesterday));
  assert_eq!(timeline.take_changes(), vec![TimelineChange::Reset]);
  assert_counted(&timeline);
}

#[test]
fn repeated_rebuckets_reuse_category_slots() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  dir.add_event(alice, text(60, "one")).unwrap();
  dir.add_event(alice, call(600)).unwrap();
  let mut timeline = timeline_of(&dir, alice);
  let arena = timeline.arena_len();

  for days in 1..=7 {
    assert!(timeline.rebucket(now() + Duration::days(days)));
    assert_eq!(timeline.arena_len(), arena);
  }
  assert_eq!(timeline.leaf_count(), 2);
  assert_ordered(&timeline);
  assert_counted(&timeline);
}

// ─── Peers ───────────────────────────────────────────────────────────────────

#[test]
fn peers_are_listed_most_recent_first() {
  let mut dir = directory();
  let alice = peer(&mut dir, "alice");
  let bob = peer(&mut dir, "bob");
  peer(&mut dir, "carol");
  dir.add_event(alice, call(100)).unwrap();
  dir.add_event(bob, call(50)).unwrap();

  let mut peers = PeersTimeline::new();
  peers.init(&dir);
  assert_eq!(peers.entries().collect::<Vec<_>>(), vec![bob, alice]);
  dir.take_notifications();

  dir.add_event(alice, call(1)).unwrap();
  for notification in dir.take_notifications() {
    peers.apply(&dir, &notification);
  }

  assert_eq!(peers.most_recent(), Some(alice));
  assert_eq!(peers.len(), 2);
}
