use std::path::Path;

pub fn run(root: &Path, port: u16, no_open: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let root = root.to_path_buf();

    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("Flat editor for {} → http://localhost:{actual_port}", root.display());

        tokio::select! {
            res = flat_server::serve_on(&root, listener, !no_open) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
