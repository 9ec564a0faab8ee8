//! The sync coordinator under contention: opposite staging orders on the
//! same cells must not deadlock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use basalt_asm::ops::{AcquireKind, Return as RetOp, Sync as SyncOp, SyncSource, Unsync};
use basalt_vm::context;
use basalt_vm::prelude::*;

/// Build `lock_both(a, b)`: sync both cells exclusively, then unsync.
/// Arguments are two shared cells at slots 0 and 2.
fn build_lock_both(program: &mut Program, name: &str) {
    let mut f = FunctionBuilder::new(name, "lock_both").with_stack_slots(4);
    f.add_arg(&context::SHARED);
    f.add_arg(&context::SHARED);
    f.push_bytecode_many(&SyncOp::encode(&[
        SyncSource {
            src: 0,
            kind: AcquireKind::Exclusive,
        },
        SyncSource {
            src: 2,
            kind: AcquireKind::Exclusive,
        },
    ]));
    f.push_bytecode(Unsync.encode());
    f.push_bytecode(
        RetOp {
            has_return: false,
            src: 0,
        }
        .encode(),
    );
    f.build(program);
}

/// Two threads lock `{A, B}` exclusively in opposite source orders, many
/// times. Address-ordered acquisition means both always complete.
#[test]
fn opposite_order_locking_does_not_deadlock() {
    let mut program = Program::new();
    build_lock_both(&mut program, "sync::ab");
    build_lock_both(&mut program, "sync::ba");
    let program = Arc::new(program);

    let cell_a = Shared::new(1i64, &context::INT);
    let cell_b = Shared::new(2i64, &context::INT);

    const ROUNDS: usize = 200;
    let completions = Arc::new(AtomicUsize::new(0));

    let spawn = |name: &'static str, first: Shared, second: Shared| {
        let program = Arc::clone(&program);
        let completions = Arc::clone(&completions);
        thread::spawn(move || {
            let func = program.find_function(name).unwrap();
            for _ in 0..ROUNDS {
                let mut args = CallArgs::new(&func);
                args.push(first.clone_ref(), &context::SHARED);
                args.push(second.clone_ref(), &context::SHARED);
                args.call(Return::none()).unwrap();
            }
            let mut first = first;
            let mut second = second;
            first.deinit();
            second.deinit();
            completions.fetch_add(1, Ordering::SeqCst);
        })
    };

    let forward = spawn("sync::ab", cell_a.clone_ref(), cell_b.clone_ref());
    let backward = spawn("sync::ba", cell_b.clone_ref(), cell_a.clone_ref());

    forward.join().expect("forward thread must complete");
    backward.join().expect("backward thread must complete");
    assert_eq!(completions.load(Ordering::SeqCst), 2);

    let mut cell_a = cell_a;
    let mut cell_b = cell_b;
    cell_a.deinit();
    cell_b.deinit();
}

/// A writer inside a sync block is exclusive: concurrent increments through
/// two threads never lose an update.
#[test]
fn exclusive_sync_serializes_writers() {
    use basalt_vm::sync::queue;

    let cell = Shared::new(0i64, &context::INT);
    const ROUNDS: usize = 500;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let cell = cell.clone_ref();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    unsafe {
                        queue::add_exclusive(queue::SyncObject::rwlock(cell.lock_addr()));
                    }
                    queue::acquire();
                    let mut cell = cell.clone_ref();
                    unsafe {
                        let value = cell.get_mut().cast::<i64>();
                        *value += 1;
                    }
                    cell.deinit();
                    queue::release();
                }
                let mut cell = cell;
                cell.deinit();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    cell.lock_shared();
    let total = unsafe { *cell.get().cast::<i64>() };
    cell.unlock_shared();
    assert_eq!(total, (2 * ROUNDS) as i64);

    let mut cell = cell;
    cell.deinit();
}

/// Weak observers order against their owner on the same lock.
#[test]
fn weak_and_owner_share_ordering() {
    let mut program = Program::new();

    // sync(weak shared, unique exclusive) then unsync
    let mut f = FunctionBuilder::new("sync::mixed", "mixed").with_stack_slots(4);
    f.add_arg(&context::WEAK);
    f.add_arg(&context::UNIQUE);
    f.push_bytecode_many(&SyncOp::encode(&[
        SyncSource {
            src: 0,
            kind: AcquireKind::Shared,
        },
        SyncSource {
            src: 2,
            kind: AcquireKind::Exclusive,
        },
    ]));
    f.push_bytecode(Unsync.encode());
    f.push_bytecode(
        RetOp {
            has_return: false,
            src: 0,
        }
        .encode(),
    );
    f.build(&mut program);

    let unique = Unique::new(5i64, &context::INT);
    let other = Unique::new(6i64, &context::INT);
    let weak = unique.make_weak();
    assert_eq!(weak.lock_addr(), unique.lock_addr());

    let func = program.find_function("sync::mixed").unwrap();
    let mut args = CallArgs::new(&func);
    args.push(weak, &context::WEAK);
    args.push(other, &context::UNIQUE);
    args.call(Return::none()).unwrap();

    let mut unique = unique;
    unique.deinit();
}
