use treekv_core::{
    Command, Condition, ErrorKind, MachineConfig, MatchOptions, NameMatch, NodeId, NodeProps,
    Path, Pattern, PatternComponent, Reply, TreeKv,
};

fn path(ids: &[&str]) -> Path {
    Path::new(ids.iter().map(|id| NodeId::atom(*id)).collect())
}

fn pattern(ids: &[&str]) -> Pattern {
    Pattern::ids(ids.iter().map(|id| NodeId::atom(*id)))
}

fn put(machine: &mut TreeKv, ids: &[&str], data: &[u8]) -> Reply {
    machine.apply(Command::Put {
        pattern: pattern(ids),
        payload: Some(data.to_vec()),
        keep_while: None,
    })
}

fn delete(machine: &mut TreeKv, ids: &[&str]) -> Reply {
    machine.apply(Command::Delete {
        pattern: pattern(ids),
    })
}

fn props_of(machine: &TreeKv, ids: &[&str]) -> NodeProps {
    let result = machine
        .query(&pattern(ids), &MatchOptions::default())
        .unwrap();
    result[&path(ids)].clone()
}

#[test]
fn creating_put_replies_with_the_empty_projection() {
    let mut machine = TreeKv::new();
    let reply = put(&mut machine, &["a"], b"1");
    let Reply::Ok(map) = reply else {
        panic!("expected ok reply, got {reply:?}");
    };
    assert_eq!(map.len(), 1);
    assert!(map[&path(&["a"])].is_absent());
}

#[test]
fn updating_put_replies_with_the_prior_projection() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a"], b"old");
    let reply = put(&mut machine, &["a"], b"new");
    let Reply::Ok(map) = reply else {
        panic!("expected ok reply, got {reply:?}");
    };
    let prior = &map[&path(&["a"])];
    assert_eq!(prior.payload_version, Some(1));
    assert_eq!(prior.data.as_deref(), Some(b"old".as_slice()));
    assert_eq!(props_of(&machine, &["a"]).data.as_deref(), Some(b"new".as_slice()));
}

#[test]
fn put_always_bumps_the_payload_version() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a"], b"same");
    put(&mut machine, &["a"], b"same");
    let props = props_of(&machine, &["a"]);
    assert_eq!(props.payload_version, Some(2));
    assert_eq!(props.data.as_deref(), Some(b"same".as_slice()));

    // Clearing the payload is a write too.
    machine.apply(Command::Put {
        pattern: pattern(&["a"]),
        payload: None,
        keep_while: None,
    });
    let props = props_of(&machine, &["a"]);
    assert_eq!(props.payload_version, Some(3));
    assert_eq!(props.data, None);
}

#[test]
fn predicate_patterns_never_create_nodes() {
    let mut machine = TreeKv::new();
    let reply = machine.apply(Command::Put {
        pattern: Pattern::new(vec![PatternComponent::Cond(Condition::NameMatches(
            NameMatch::Regex("nothing".to_owned()),
        ))]),
        payload: Some(b"1".to_vec()),
        keep_while: None,
    });
    let Reply::Ok(map) = reply else {
        panic!("expected ok reply, got {reply:?}");
    };
    assert!(map.is_empty());
    assert_eq!(machine.root().child_count(), 0);
}

#[test]
fn multi_match_put_updates_every_matched_node() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a"], b"1");
    put(&mut machine, &["b"], b"2");

    let reply = machine.apply(Command::Put {
        pattern: Pattern::new(vec![PatternComponent::Cond(Condition::NameMatches(
            NameMatch::Any,
        ))]),
        payload: Some(b"both".to_vec()),
        keep_while: None,
    });
    assert!(reply.is_ok());
    assert_eq!(props_of(&machine, &["a"]).data.as_deref(), Some(b"both".as_slice()));
    assert_eq!(props_of(&machine, &["b"]).data.as_deref(), Some(b"both".as_slice()));
    assert_eq!(props_of(&machine, &["a"]).payload_version, Some(2));
}

#[test]
fn delete_leaves_intermediaries_in_place() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a", "b", "c"], b"1");
    let reply = delete(&mut machine, &["a", "b", "c"]);
    let Reply::Ok(map) = reply else {
        panic!("expected ok reply, got {reply:?}");
    };
    assert_eq!(map.len(), 1);
    assert_eq!(map[&path(&["a", "b", "c"])].payload_version, Some(1));

    assert!(machine
        .query(&pattern(&["a", "b", "c"]), &MatchOptions::default())
        .unwrap()
        .is_empty());
    let b = props_of(&machine, &["a", "b"]);
    assert_eq!(b.child_list_count, Some(0));
    assert_eq!(b.child_list_version, Some(2));
    assert_eq!(props_of(&machine, &["a"]).child_list_count, Some(1));
}

#[test]
fn recreating_a_deleted_node_resets_its_counters() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a"], b"1");
    put(&mut machine, &["a"], b"2");
    assert_eq!(props_of(&machine, &["a"]).payload_version, Some(2));

    delete(&mut machine, &["a"]);
    put(&mut machine, &["a"], b"3");
    let props = props_of(&machine, &["a"]);
    assert_eq!(props.payload_version, Some(1));
    assert_eq!(props.child_list_version, Some(1));
}

#[test]
fn deleting_the_root_path_clears_children_but_keeps_the_root() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a", "x"], b"1");
    put(&mut machine, &["b"], b"2");

    let reply = machine.apply(Command::Delete {
        pattern: Pattern::default(),
    });
    let Reply::Ok(map) = reply else {
        panic!("expected ok reply, got {reply:?}");
    };
    assert_eq!(map.len(), 1);
    assert!(map.contains_key(&Path::root()));

    assert_eq!(machine.root().child_count(), 0);
    let result = machine
        .query(&Pattern::default(), &MatchOptions::default())
        .unwrap();
    assert_eq!(result[&Path::root()].child_list_count, Some(0));
}

#[test]
fn delete_matching_parent_and_child_processes_parents_first() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a"], b"1");
    put(&mut machine, &["a", "b"], b"2");

    let reply = machine.apply(Command::Delete {
        pattern: Pattern::new(vec![PatternComponent::Cond(Condition::PathMatches(
            NameMatch::Any,
        ))]),
    });
    let Reply::Ok(map) = reply else {
        panic!("expected ok reply, got {reply:?}");
    };
    // Both matched; prior projections come from the pre-delete pass.
    assert_eq!(map.len(), 2);
    assert_eq!(machine.root().child_count(), 0);
}

#[test]
fn above_root_anchor_is_an_invalid_path_error() {
    let mut machine = TreeKv::new();
    let reply = machine.apply(Command::Put {
        pattern: Pattern::new(vec![PatternComponent::Parent]),
        payload: Some(b"1".to_vec()),
        keep_while: None,
    });
    let err = reply.error().expect("expected an error reply");
    assert_eq!(err.kind, ErrorKind::InvalidPath);
}

#[test]
fn expect_specific_node_errors() {
    let mut machine = TreeKv::new();
    let options = MatchOptions {
        expect_specific_node: true,
        ..MatchOptions::default()
    };

    let reply = machine.apply(Command::Get {
        pattern: pattern(&["missing"]),
        options: options.clone(),
    });
    assert_eq!(reply.error().unwrap().kind, ErrorKind::NoMatchingNodes);

    put(&mut machine, &["a"], b"1");
    put(&mut machine, &["b"], b"2");
    let reply = machine.apply(Command::Get {
        pattern: Pattern::new(vec![PatternComponent::Cond(Condition::NameMatches(
            NameMatch::Any,
        ))]),
        options,
    });
    assert_eq!(reply.error().unwrap().kind, ErrorKind::ManyMatchingNodes);
}

#[test]
fn bad_regex_is_an_invalid_pattern_error() {
    let machine = TreeKv::new();
    let err = machine
        .query(
            &Pattern::new(vec![PatternComponent::Cond(Condition::NameMatches(
                NameMatch::Regex("(".to_owned()),
            ))]),
            &MatchOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPattern);
}

#[test]
fn result_cap_fails_the_command() {
    let mut machine = TreeKv::init(MachineConfig {
        max_results: Some(1),
        ..MachineConfig::default()
    });
    put(&mut machine, &["a"], b"1");
    put(&mut machine, &["b"], b"2");

    let reply = machine.apply(Command::Get {
        pattern: Pattern::new(vec![PatternComponent::Cond(Condition::NameMatches(
            NameMatch::Any,
        ))]),
        options: MatchOptions::default(),
    });
    assert_eq!(reply.error().unwrap().kind, ErrorKind::ResourceLimit);
}

#[test]
fn get_never_mutates_state() {
    let mut machine = TreeKv::new();
    put(&mut machine, &["a", "b"], b"1");
    let before = machine.snapshot();
    let reply = machine.apply(Command::Get {
        pattern: pattern(&["a"]),
        options: MatchOptions::default(),
    });
    assert!(reply.is_ok());
    assert_eq!(machine.snapshot(), before);
}

#[test]
fn init_replays_seed_commands() {
    let machine = TreeKv::init(MachineConfig {
        seed_commands: vec![
            Command::Put {
                pattern: pattern(&["a"]),
                payload: Some(b"1".to_vec()),
                keep_while: None,
            },
            Command::Delete {
                pattern: pattern(&["a"]),
            },
            Command::Put {
                pattern: pattern(&["b"]),
                payload: Some(b"2".to_vec()),
                keep_while: None,
            },
        ],
        ..MachineConfig::default()
    });
    assert_eq!(machine.root().child_count(), 1);
    assert_eq!(props_of(&machine, &["b"]).data.as_deref(), Some(b"2".as_slice()));
}
