//! A minimal function artifact: answers every request with 201 "ok".

use genserve_abi::{Request, ResponseWriter};

fn hello(_req: &Request<'_>, w: &mut ResponseWriter<'_>) {
    w.set_status(201);
    w.write(b"ok");
}

genserve_abi::export_handler!(Handler, hello);
