//! End-to-end harness tests driving real guest modules authored in wat.

use simchain_host::{classify, run_module, HostRegistry, HostState};
use std::path::PathBuf;
use wasmtime::{Engine, Module, Store};

fn write_module(wat_source: &str) -> (tempfile::TempDir, PathBuf) {
    let wasm = wat::parse_str(wat_source).unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("guest.wasm");
    std::fs::write(&path, wasm).unwrap();
    (dir, path)
}

#[test]
fn resolve_rejects_unknown_import() {
    let engine = Engine::default();
    let wasm = wat::parse_str(
        r#"(module
            (import "env" "no_such_call" (func (param i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "_start")))"#,
    )
    .unwrap();
    let module = Module::new(&engine, wasm).unwrap();
    let registry = HostRegistry::new(&engine).unwrap();
    let mut store = Store::new(&engine, HostState::new(vec![]));

    let err = registry.resolve(&mut store, &module).unwrap_err();
    assert!(err.to_string().contains("no_such_call"));
}

#[test]
fn block_production_visible_through_head_block_info() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "create_chain" (func $create_chain (param i32 i32) (result i32)))
            (import "env" "finish_block" (func $finish_block (param i32)))
            (import "env" "get_head_block_info" (func $head_info (param i32 i32 i32)))
            (import "env" "assert_message" (func $assert (param i32 i32 i32)))
            (import "env" "destroy_chain" (func $destroy_chain (param i32)))
            (memory (export "memory") 1)
            (table (export "__indirect_function_table") 2 funcref)
            (elem (i32.const 1) $alloc)
            (func $alloc (param i32 i32) (result i32) (i32.const 256))
            (data (i32.const 0) "head block num mismatch")
            (func (export "_start")
                (local $chain i32)
                (local.set $chain (call $create_chain (i32.const 0) (i32.const 0)))
                (call $finish_block (local.get $chain))
                (call $finish_block (local.get $chain))
                (call $head_info (local.get $chain) (i32.const 0) (i32.const 1))
                (call $assert
                    (i32.eq (i32.load (i32.const 256)) (i32.const 2))
                    (i32.const 0) (i32.const 23))
                (call $destroy_chain (local.get $chain))))"#,
    );
    run_module(&path, vec![]).unwrap();
}

#[test]
fn empty_partition_yields_end_then_minus_one() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "create_chain" (func $create_chain (param i32 i32) (result i32)))
            (import "env" "select_chain_for_db" (func $select (param i32)))
            (import "env" "db_find_i64" (func $find (param i64 i64 i64 i64) (result i32)))
            (import "env" "db_end_i64" (func $end (param i64 i64 i64) (result i32)))
            (import "env" "db_next_i64" (func $next (param i32 i32) (result i32)))
            (import "env" "assert_message" (func $assert (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "end iterator expected")
            (func (export "_start")
                (local $chain i32)
                (local $it i32)
                (local.set $chain (call $create_chain (i32.const 0) (i32.const 0)))
                (call $select (local.get $chain))
                (local.set $it
                    (call $find (i64.const 1) (i64.const 2) (i64.const 3) (i64.const 4)))
                (call $assert
                    (i32.lt_s (local.get $it) (i32.const -1))
                    (i32.const 0) (i32.const 21))
                (call $assert
                    (i32.eq (local.get $it)
                        (call $end (i64.const 1) (i64.const 2) (i64.const 3)))
                    (i32.const 0) (i32.const 21))
                (call $assert
                    (i32.eq (call $next (local.get $it) (i32.const 64)) (i32.const -1))
                    (i32.const 0) (i32.const 21))))"#,
    );
    run_module(&path, vec![]).unwrap();
}

#[test]
fn sha256_writes_digest_into_guest_memory() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "sha256" (func $sha256 (param i32 i32 i32)))
            (import "env" "assert_message" (func $assert (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "abc")
            (data (i32.const 16) "sha256 mismatch")
            (func (export "_start")
                (call $sha256 (i32.const 0) (i32.const 3) (i32.const 512))
                ;; first 8 bytes of sha256("abc"), little-endian load
                (call $assert
                    (i64.eq (i64.load (i32.const 512)) (i64.const 0xeacf018fbf1678ba))
                    (i32.const 16) (i32.const 15))))"#,
    );
    run_module(&path, vec![]).unwrap();
}

#[test]
fn guest_args_are_forwarded() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "get_arg_counts" (func $counts (param i32 i32)))
            (import "env" "get_args" (func $args (param i32 i32)))
            (import "env" "assert_message" (func $assert (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "argv mismatch")
            (func (export "_start")
                (call $counts (i32.const 100) (i32.const 104))
                (call $assert
                    (i32.eq (i32.load (i32.const 100)) (i32.const 2))
                    (i32.const 0) (i32.const 13))
                ;; "foo\0bar\0" -> 8 bytes of argv_buf
                (call $assert
                    (i32.eq (i32.load (i32.const 104)) (i32.const 8))
                    (i32.const 0) (i32.const 13))
                (call $args (i32.const 200) (i32.const 300))
                ;; argv[0] points at 'f'
                (call $assert
                    (i32.eq (i32.load8_u (i32.load (i32.const 200))) (i32.const 0x66))
                    (i32.const 0) (i32.const 13))
                ;; argv[1] points at 'b'
                (call $assert
                    (i32.eq (i32.load8_u (i32.load (i32.const 204))) (i32.const 0x62))
                    (i32.const 0) (i32.const 13))))"#,
    );
    run_module(&path, vec!["foo".to_string(), "bar".to_string()]).unwrap();
}

#[test]
fn failed_assertion_is_a_guest_assertion() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "assert_message" (func $assert (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "expected failure")
            (func (export "_start")
                (call $assert (i32.const 0) (i32.const 0) (i32.const 16))))"#,
    );
    let err = run_module(&path, vec![]).unwrap_err();
    let (category, message) = classify(&err);
    assert_eq!(category, "guest assertion");
    assert_eq!(message, "expected failure");
}

#[test]
fn exit_zero_is_a_clean_stop() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "exit" (func $exit (param i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (call $exit (i32.const 0))
                unreachable))"#,
    );
    run_module(&path, vec![]).unwrap();
}

#[test]
fn exit_nonzero_is_a_failure() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "exit" (func $exit (param i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (call $exit (i32.const 3))))"#,
    );
    let err = run_module(&path, vec![]).unwrap_err();
    assert_eq!(classify(&err).0, "guest exit");
}

#[test]
fn out_of_bounds_pointer_is_a_host_fault() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "prints" (func $prints (param i32 i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (call $prints (i32.const 0x7fffff00) (i32.const 16))))"#,
    );
    let err = run_module(&path, vec![]).unwrap_err();
    let (category, message) = classify(&err);
    assert_eq!(category, "host fault");
    assert!(message.contains("out of bounds"));
}

#[test]
fn null_allocator_entry_is_a_host_fault() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "create_chain" (func $create_chain (param i32 i32) (result i32)))
            (import "env" "get_head_block_info" (func $head_info (param i32 i32 i32)))
            (memory (export "memory") 1)
            (table (export "__indirect_function_table") 2 funcref)
            (func (export "_start")
                (call $head_info
                    (call $create_chain (i32.const 0) (i32.const 0))
                    (i32.const 0) (i32.const 0))))"#,
    );
    let err = run_module(&path, vec![]).unwrap_err();
    let (category, message) = classify(&err);
    assert_eq!(category, "host fault");
    assert!(message.contains("allocator"));
}

#[test]
fn destroyed_chain_handle_faults_as_chain_error() {
    let (_dir, path) = write_module(
        r#"(module
            (import "env" "create_chain" (func $create_chain (param i32 i32) (result i32)))
            (import "env" "destroy_chain" (func $destroy_chain (param i32)))
            (import "env" "finish_block" (func $finish_block (param i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (local $chain i32)
                (local.set $chain (call $create_chain (i32.const 0) (i32.const 0)))
                (call $destroy_chain (local.get $chain))
                (call $finish_block (local.get $chain))))"#,
    );
    let err = run_module(&path, vec![]).unwrap_err();
    let (category, message) = classify(&err);
    assert_eq!(category, "chain error");
    assert!(message.contains("destroyed"));
}
