//! Property-style tests for the stack accessor
//!
//! Random push/pop/insert/remove sequences are checked against a plain
//! `Vec` model of the stack.

use luabase::lua::{LuaError, LuaState, Type};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn snapshot(state: &LuaState) -> Vec<f64> {
    (1..=state.top()).map(|i| state.get_number(i)).collect()
}

/// Net pushes minus pops, with over-pops rejected
#[test]
fn test_random_push_pop_sequences() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _round in 0..20 {
        let mut state = LuaState::new();
        let mut expected = 0usize;

        for _ in 0..300 {
            if rng.gen_bool(0.6) {
                match rng.gen_range(0..4) {
                    0 => state.push_nil().unwrap(),
                    1 => state.push_number(rng.gen()).unwrap(),
                    2 => state.push_string("s").unwrap(),
                    _ => state.create_table().unwrap(),
                }
                expected += 1;
            } else {
                let n = rng.gen_range(0..6);
                let result = state.pop(n);
                if n > expected {
                    assert_eq!(
                        result,
                        Err(LuaError::StackUnderflow { requested: n, available: expected })
                    );
                } else {
                    result.unwrap();
                    expected -= n;
                }
            }
            assert_eq!(state.top() as usize, expected);
        }
    }
}

#[test]
fn test_random_insert_remove_match_model() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut state = LuaState::new();
    let mut model: Vec<f64> = Vec::new();
    let mut next = 0.0;

    for _ in 0..500 {
        match rng.gen_range(0..4) {
            0 | 1 => {
                state.push_number(next).unwrap();
                model.push(next);
                next += 1.0;
            }
            2 if !model.is_empty() => {
                let pos = rng.gen_range(1..=model.len());
                state.insert(pos as i32).unwrap();
                let top = model.pop().unwrap();
                model.insert(pos - 1, top);
            }
            3 if !model.is_empty() => {
                // Negative indices count from the top
                let back = rng.gen_range(1..=model.len());
                state.remove(-(back as i32)).unwrap();
                model.remove(model.len() - back);
            }
            _ => {}
        }
        assert_eq!(snapshot(&state), model);
    }
}

#[test]
fn test_push_value_never_moves_source() {
    let mut state = LuaState::new();
    state.push_string("keep").unwrap();
    state.push_number(2.0).unwrap();

    for _ in 0..5 {
        state.push_value(1).unwrap();
    }

    assert_eq!(state.top(), 7);
    assert!(state.is_type(1, Type::String));
    assert!(state.raw_equal(1, -1));
    assert_eq!(state.get_number(2), 2.0);
}

#[test]
fn test_index_resolved_before_mutation() {
    let mut state = LuaState::new();
    state.create_table().unwrap();
    state.push_string("value").unwrap();

    // -2 names the table before the value is popped
    state.set_field(-2, "key").unwrap();
    state.get_field(-1, "key").unwrap();
    assert_eq!(state.get_string(-1).as_deref(), Some("value"));
}

#[test]
fn test_invalid_positions_are_rejected() {
    let mut state = LuaState::new();
    state.push_nil().unwrap();

    assert_eq!(state.insert(5), Err(LuaError::InvalidIndex(5)));
    assert_eq!(state.remove(-3), Err(LuaError::InvalidIndex(-3)));
    assert_eq!(state.push_value(0), Err(LuaError::InvalidIndex(0)));
    assert_eq!(state.get_type(2), Type::None);
    assert!(!state.is_valid_index(2));
    assert!(state.is_valid_index(-1));
    assert_eq!(state.top(), 1);
}
